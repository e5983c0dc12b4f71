//! Work Handler Registry
//!
//! Maps handler names carried by `Work` to executable Rust closures. Every
//! node of a cluster registers the same names so work can run wherever it
//! is placed.

use super::types::*;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous work handler function.
pub type WorkHandlerFn =
    Arc<dyn Fn(Work) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry holding the mapping between handler names and their implementation.
pub struct WorkHandlerRegistry {
    handlers: DashMap<String, WorkHandlerFn>,
}

impl WorkHandlerRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new handler function under a specific name.
    pub fn register<F, Fut>(&self, handler_name: &str, handler: F)
    where
        F: Fn(Work) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so all handlers fit one map.
        let handler_fn: WorkHandlerFn = Arc::new(move |work: Work| {
            Box::pin(handler(work)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.handlers.insert(handler_name.to_string(), handler_fn);

        tracing::info!("Registered work handler: {}", handler_name);
    }

    /// Looks up the handler named by the work and runs it.
    ///
    /// # Returns
    /// * `Ok(())` if the handler executed successfully.
    /// * `Err` if the handler failed or if no handler exists for the given name.
    pub async fn execute(&self, work: Work) -> Result<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let handler_fn = self
            .handlers
            .get(&work.handler)
            .map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => {
                tracing::debug!(
                    "Executing work {} with handler '{}'",
                    work.id.0,
                    work.handler
                );
                handler_fn(work).await
            }
            None => {
                let error = format!("Unknown work handler: {}", work.handler);
                tracing::error!("{}", error);
                Err(anyhow::anyhow!(error))
            }
        }
    }

    /// Returns a list of all registered handler names.
    pub fn list_handlers(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_handler(&self, handler_name: &str) -> bool {
        self.handlers.contains_key(handler_name)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for WorkHandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}
