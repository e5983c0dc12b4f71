//! Membership Module Tests
//!
//! ## Test Scopes
//! - **Data Structures**: identity semantics and gossip wire messages.
//! - **View**: the work manager's member set.
//! - **Service Logic**: initialization, join via seed, view publication, leave.

#[cfg(test)]
mod tests {
    use crate::membership::service::MembershipService;
    use crate::membership::types::{GossipMessage, Node, NodeId, NodeState};
    use crate::membership::view::MembershipView;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn node(id: &str, port: u16) -> Node {
        Node {
            id: NodeId(id.to_string()),
            gossip_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], port + 1)),
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        }
    }

    async fn wait_for_view(service: &MembershipService, expected: usize) -> bool {
        let mut view = service.subscribe();
        let deadline = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);

        loop {
            if view.borrow_and_update().len() == expected {
                return true;
            }
            tokio::select! {
                changed = view.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = &mut deadline => return false,
            }
        }
    }

    // ============================================================
    // NODE ID TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        assert_ne!(id1, id2, "Each NodeId should be unique");
    }

    #[test]
    fn test_node_id_ordering_and_display() {
        let a = NodeId::from("node-a");
        let b = NodeId::from("node-b");

        assert!(a < b);
        assert_eq!(a.to_string(), "node-a");
        assert_eq!(a.as_str(), "node-a");
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_node_serialization_skips_last_seen() {
        let original = node("test-node", 5000);

        let json = serde_json::to_string(&original).expect("Serialization failed");
        let restored: Node = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.gossip_addr, original.gossip_addr);
        assert_eq!(restored.rpc_addr, original.rpc_addr);
        assert!(restored.last_seen.is_none());
    }

    #[test]
    fn test_gossip_ping_carries_rpc_address() {
        let msg = GossipMessage::Ping {
            from: NodeId::from("sender-node"),
            rpc_addr: "127.0.0.1:7001".parse().unwrap(),
            incarnation: 5,
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Ping");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Ping");

        let GossipMessage::Ping {
            from,
            rpc_addr,
            incarnation,
        } = decoded
        else {
            panic!("Wrong message type");
        };
        assert_eq!(from.0, "sender-node");
        assert_eq!(rpc_addr.port(), 7001);
        assert_eq!(incarnation, 5);
    }

    #[test]
    fn test_gossip_ack_carries_member_list() {
        let msg = GossipMessage::Ack {
            from: NodeId::from("responder"),
            incarnation: 10,
            members: vec![node("node-1", 5000), node("node-2", 5002)],
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Ack");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Ack");

        let GossipMessage::Ack { members, .. } = decoded else {
            panic!("Wrong message type");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].rpc_addr.port(), 5003);
    }

    // ============================================================
    // MEMBERSHIP VIEW TESTS
    // ============================================================

    #[test]
    fn test_view_insert_and_remove() {
        let view = MembershipView::new();
        let a = NodeId::from("a");
        let b = NodeId::from("b");

        assert!(view.insert(&a));
        assert!(!view.insert(&a), "second insert is a no-op");
        assert!(view.insert(&b));
        assert_eq!(view.len(), 2);

        assert_eq!(view.peers(&a), vec![b.clone()]);

        assert!(view.remove(&b));
        assert!(!view.contains(&b));
        assert!(!view.remove(&b));
    }

    #[test]
    fn test_view_members_sorted() {
        let view = MembershipView::new();
        for id in ["c", "a", "b"] {
            view.insert(&NodeId::from(id));
        }

        let members: Vec<String> = view.members().into_iter().map(|id| id.0).collect();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    // ============================================================
    // MEMBERSHIP SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_membership_get_member() {
        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let rpc_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let service = MembershipService::new(bind_addr, rpc_addr, vec![])
            .await
            .unwrap();

        let member = service.get_member(&service.local_node.id);
        assert!(member.is_some());
        assert_eq!(member.unwrap().id, service.local_node.id);

        assert!(service.get_member(&NodeId::from("non-existent")).is_none());
    }

    #[tokio::test]
    async fn test_join_via_seed_publishes_view() {
        let rpc_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let seed = MembershipService::new("127.0.0.1:0".parse().unwrap(), rpc_addr, vec![])
            .await
            .unwrap();

        let joiner = MembershipService::new(
            "127.0.0.1:0".parse().unwrap(),
            rpc_addr,
            vec![seed.local_node.gossip_addr],
        )
        .await
        .unwrap();

        seed.clone().start().await;
        joiner.clone().start().await;

        assert!(wait_for_view(&seed, 2).await, "seed should see the joiner");
        assert!(wait_for_view(&joiner, 2).await, "joiner should learn the seed");

        joiner.shutdown().await;
        assert!(wait_for_view(&seed, 1).await, "leave should shrink the view");

        seed.shutdown().await;
    }
}
