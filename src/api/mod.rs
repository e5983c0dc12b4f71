//! HTTP API Module
//!
//! Public face of a node: work submission plus read-only views of the
//! statistics, the capacity table and the membership view.
//!
//! ## Submodules
//! - **`protocol`**: endpoint paths and JSON bodies.
//! - **`handlers`**: axum handlers over a shared [`DistributedWorkManager`].

pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;

use crate::workmanager::manager::DistributedWorkManager;
use handlers::*;
use protocol::*;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use std::sync::Arc;

pub fn router(manager: Arc<DistributedWorkManager>) -> Router {
    Router::new()
        .route(ENDPOINT_DO_WORK, post(handle_do_work))
        .route(ENDPOINT_START_WORK, post(handle_start_work))
        .route(ENDPOINT_SCHEDULE_WORK, post(handle_schedule_work))
        .route(ENDPOINT_STATS, get(handle_stats))
        .route(ENDPOINT_CAPACITY, get(handle_capacity))
        .route(ENDPOINT_MEMBERS, get(handle_members))
        .route(&format!("{}/:node", ENDPOINT_PING), get(handle_ping))
        .layer(Extension(manager))
}
