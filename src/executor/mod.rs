//! Local Work Executor Module
//!
//! The node-local side of work execution: two bounded worker pools
//! (short-running and long-running) that run registered handlers.
//!
//! ## Submodules
//! - **`types`**: the `Work` definition that travels between nodes.
//! - **`registry`**: maps handler names (e.g., "sleep") to executable Rust code.
//! - **`pool`**: the semaphore-bounded worker pools implementing [`LocalExecutor`].

pub mod pool;
pub mod registry;
pub mod types;


use crate::error::WorkError;
use async_trait::async_trait;
use types::Work;

/// Invoked once with `true` on success or `false` on failure after the work ran.
pub type OutcomeHook = Box<dyn FnOnce(bool) + Send + 'static>;

/// Contract the work manager relies on to run work on this node.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    /// Runs the work and returns once it has completed.
    async fn do_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError>;

    /// Returns once the work has started; the value is the start delay in ms.
    async fn start_work(&self, work: Work, on_complete: OutcomeHook) -> Result<u64, WorkError>;

    /// Returns once the work has been accepted for later execution.
    async fn schedule_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError>;

    fn short_running_free(&self) -> u64;

    fn long_running_free(&self) -> u64;

    /// Free workers in the pool the given work would run on.
    fn free_workers(&self, work: &Work) -> u64 {
        if work.long_running {
            self.long_running_free()
        } else {
            self.short_running_free()
        }
    }
}
