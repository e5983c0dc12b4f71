//! Worker Pool Implementation
//!
//! Two semaphore-bounded pools. A work item waits up to `start_timeout` for a
//! free worker in its pool; if none frees up it is rejected. Admitted work is
//! spawned onto the runtime while holding its permit, so the number of
//! available permits is the pool's free-worker count.

use super::registry::WorkHandlerRegistry;
use super::types::*;
use super::{LocalExecutor, OutcomeHook};
use crate::error::WorkError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub short_running_threads: usize,
    pub long_running_threads: usize,
    /// How long a submission may wait for a free worker before it is rejected.
    #[serde(with = "crate::config::duration_ms")]
    pub start_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            short_running_threads: 8,
            long_running_threads: 4,
            start_timeout: Duration::from_secs(1),
        }
    }
}

pub struct PoolExecutor {
    handlers: Arc<WorkHandlerRegistry>,
    short_running: Arc<Semaphore>,
    long_running: Arc<Semaphore>,
    start_timeout: Duration,
}

impl PoolExecutor {
    pub fn new(handlers: Arc<WorkHandlerRegistry>, config: PoolConfig) -> Arc<Self> {
        tracing::info!(
            "Starting worker pools: {} short-running, {} long-running",
            config.short_running_threads,
            config.long_running_threads
        );

        Arc::new(Self {
            handlers,
            short_running: Arc::new(Semaphore::new(config.short_running_threads)),
            long_running: Arc::new(Semaphore::new(config.long_running_threads)),
            start_timeout: config.start_timeout,
        })
    }

    pub fn handlers(&self) -> &Arc<WorkHandlerRegistry> {
        &self.handlers
    }

    async fn acquire(&self, work: &Work) -> Result<OwnedSemaphorePermit, WorkError> {
        let (pool, kind) = if work.long_running {
            (self.long_running.clone(), "long-running")
        } else {
            (self.short_running.clone(), "short-running")
        };

        match tokio::time::timeout(self.start_timeout, pool.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(WorkError::Rejected {
                reason: format!("{} pool is closed", kind),
            }),
            Err(_) => {
                tracing::warn!(
                    "Rejecting work {}: no {} worker free within {:?}",
                    work.id.0,
                    kind,
                    self.start_timeout
                );
                Err(WorkError::Rejected {
                    reason: format!("no {} worker free within {:?}", kind, self.start_timeout),
                })
            }
        }
    }

    /// Runs the work on the runtime while holding its worker permit.
    fn spawn(
        &self,
        work: Work,
        permit: OwnedSemaphorePermit,
        on_complete: OutcomeHook,
    ) -> JoinHandle<Result<(), WorkError>> {
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            let work_id = work.id.clone();

            // Inner task so a panicking handler still reports a failure.
            let result = match tokio::spawn(async move { handlers.execute(work).await }).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(WorkError::Failed(e.to_string())),
                Err(e) => Err(WorkError::Failed(format!("work handler panicked: {}", e))),
            };

            match &result {
                Ok(()) => tracing::debug!("Work {} completed", work_id.0),
                Err(e) => tracing::warn!("Work {} failed: {}", work_id.0, e),
            }

            // Worker is free again before the outcome is reported.
            drop(permit);
            on_complete(result.is_ok());
            result
        })
    }
}

#[async_trait]
impl LocalExecutor for PoolExecutor {
    async fn do_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError> {
        let permit = self.acquire(&work).await?;

        match self.spawn(work, permit, on_complete).await {
            Ok(result) => result,
            Err(e) => Err(WorkError::Failed(e.to_string())),
        }
    }

    async fn start_work(&self, work: Work, on_complete: OutcomeHook) -> Result<u64, WorkError> {
        let submitted = Instant::now();
        let permit = self.acquire(&work).await?;
        let start_delay = submitted.elapsed().as_millis() as u64;

        self.spawn(work, permit, on_complete);

        Ok(start_delay)
    }

    async fn schedule_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError> {
        let permit = self.acquire(&work).await?;

        self.spawn(work, permit, on_complete);

        Ok(())
    }

    fn short_running_free(&self) -> u64 {
        self.short_running.available_permits() as u64
    }

    fn long_running_free(&self) -> u64 {
        self.long_running.available_permits() as u64
    }
}
