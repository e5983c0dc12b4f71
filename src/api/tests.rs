//! API Module Tests
//!
//! Handlers are called directly with their extractors, the way axum would.

#[cfg(test)]
mod tests {
    use crate::api::handlers::*;
    use crate::api::protocol::*;
    use crate::error::{ChannelError, WorkError};
    use crate::executor::types::Work;
    use crate::membership::types::NodeId;
    use crate::testing::{FixedSelector, eventually, loopback_cluster};
    use crate::workmanager::policy::Always;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let node = NodeId::from("b");
        let timeout = WorkError::distribution(&node, ChannelError::Timeout(Duration::from_millis(1)));
        let unreachable = WorkError::distribution(&node, ChannelError::Unreachable("b".into()));

        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&unreachable), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&WorkError::Rejected { reason: "busy".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&WorkError::Failed("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_submission_endpoints() {
        let (_network, nodes) = loopback_cluster(&["a"], Duration::from_secs(1)).await;
        let manager = nodes[0].manager.clone();

        let (status, Json(done)) =
            handle_do_work(Extension(manager.clone()), Json(Work::new("noop", serde_json::Value::Null)))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert!(done.accepted);
        assert!(done.start_delay_ms.is_none());

        let (status, Json(started)) = handle_start_work(
            Extension(manager.clone()),
            Json(Work::new("noop", serde_json::Value::Null)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started.start_delay_ms, Some(0));

        nodes[0].executor.reject.store(true, Ordering::SeqCst);
        let (status, Json(rejected)) = handle_schedule_work(
            Extension(manager.clone()),
            Json(Work::new("noop", serde_json::Value::Null)),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!rejected.accepted);
        assert!(rejected.error.unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn test_read_endpoints_reflect_cluster() {
        let (_network, nodes) = loopback_cluster(&["a", "b"], Duration::from_secs(1)).await;
        let (a, b) = (&nodes[0], &nodes[1]);
        a.manager.set_policy(Arc::new(Always));
        a.manager.set_selector(FixedSelector::new(Some(b.id().clone())));

        a.manager
            .do_work(Work::new("noop", serde_json::Value::Null).distributable())
            .await
            .unwrap();
        assert!(
            eventually(Duration::from_secs(2), || {
                a.manager
                    .statistics()
                    .node(b.id())
                    .is_some_and(|s| s.work_successful == 1 && s.do_work_accepted == 1)
            })
            .await
        );

        let (_, Json(stats)) = handle_stats(Extension(a.manager.clone())).await;
        assert_eq!(stats.local_node, NodeId::from("a"));
        assert!(stats.replication_enabled);
        assert_eq!(stats.aggregate.do_work_accepted, 1);
        assert_eq!(stats.nodes.len(), 2);

        let (_, Json(members)) = handle_members(Extension(a.manager.clone())).await;
        assert_eq!(members.members, vec![NodeId::from("a"), NodeId::from("b")]);

        let (_, Json(capacity)) = handle_capacity(Extension(a.manager.clone())).await;
        assert_eq!(capacity.entries.len(), 2);

        let (status, Json(pong)) =
            handle_ping(Extension(a.manager.clone()), Path("b".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(pong.rtt_micros.is_some());

        let (status, Json(lost)) =
            handle_ping(Extension(a.manager.clone()), Path("ghost".to_string())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(lost.error.is_some());
    }

    #[test]
    fn test_response_bodies_omit_empty_fields() {
        let body = SubmitWorkResponse {
            work_id: crate::executor::types::WorkId("w-1".into()),
            accepted: true,
            start_delay_ms: None,
            error: None,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"work_id": "w-1", "accepted": true}));
    }
}
