use super::protocol::*;
use crate::error::WorkError;
use crate::executor::types::{Work, WorkId};
use crate::membership::types::NodeId;
use crate::workmanager::manager::DistributedWorkManager;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

/// Maps a submission failure to the HTTP status the caller sees.
pub fn status_for(error: &WorkError) -> StatusCode {
    match error {
        WorkError::Rejected { .. } => StatusCode::SERVICE_UNAVAILABLE,
        WorkError::Failed(_) | WorkError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        error if error.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        WorkError::Distribution { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn submitted(
    work_id: WorkId,
    outcome: Result<Option<u64>, WorkError>,
) -> (StatusCode, Json<SubmitWorkResponse>) {
    match outcome {
        Ok(start_delay_ms) => (
            StatusCode::OK,
            Json(SubmitWorkResponse {
                work_id,
                accepted: true,
                start_delay_ms,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Work {} not completed: {}", work_id.0, e);
            (
                status_for(&e),
                Json(SubmitWorkResponse {
                    work_id,
                    accepted: false,
                    start_delay_ms: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_do_work(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
    Json(work): Json<Work>,
) -> (StatusCode, Json<SubmitWorkResponse>) {
    let work_id = work.id.clone();
    tracing::debug!("doWork {} ({}) submitted", work_id.0, work.handler);

    let outcome = manager.do_work(work).await.map(|_| None);
    submitted(work_id, outcome)
}

pub async fn handle_start_work(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
    Json(work): Json<Work>,
) -> (StatusCode, Json<SubmitWorkResponse>) {
    let work_id = work.id.clone();
    tracing::debug!("startWork {} ({}) submitted", work_id.0, work.handler);

    let outcome = manager.start_work(work).await.map(Some);
    submitted(work_id, outcome)
}

pub async fn handle_schedule_work(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
    Json(work): Json<Work>,
) -> (StatusCode, Json<SubmitWorkResponse>) {
    let work_id = work.id.clone();
    tracing::debug!("scheduleWork {} ({}) submitted", work_id.0, work.handler);

    let outcome = manager.schedule_work(work).await.map(|_| None);
    submitted(work_id, outcome)
}

pub async fn handle_stats(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
) -> (StatusCode, Json<StatsResponse>) {
    let statistics = manager.statistics();

    let nodes = statistics
        .nodes()
        .into_iter()
        .filter_map(|node| {
            let counters = statistics.node(&node)?;
            Some(NodeStatistics { node, counters })
        })
        .collect();

    (
        StatusCode::OK,
        Json(StatsResponse {
            local_node: manager.id().clone(),
            replication_enabled: statistics.is_enabled(),
            aggregate: statistics.aggregate(),
            nodes,
        }),
    )
}

pub async fn handle_capacity(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
) -> (StatusCode, Json<CapacityResponse>) {
    (
        StatusCode::OK,
        Json(CapacityResponse {
            entries: manager.capacity().entries(),
        }),
    )
}

pub async fn handle_members(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
) -> (StatusCode, Json<MembersResponse>) {
    (
        StatusCode::OK,
        Json(MembersResponse {
            local_node: manager.id().clone(),
            members: manager.members(),
        }),
    )
}

pub async fn handle_ping(
    Extension(manager): Extension<Arc<DistributedWorkManager>>,
    Path(node_id): Path<String>,
) -> (StatusCode, Json<PingResponse>) {
    let node = NodeId(node_id);

    match manager.ping(&node).await {
        Ok(rtt) => (
            StatusCode::OK,
            Json(PingResponse {
                node,
                rtt_micros: Some(rtt.as_micros() as u64),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(PingResponse {
                node,
                rtt_micros: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
