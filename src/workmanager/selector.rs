//! Node Selectors
//!
//! A selector picks the peer a distributable work should run on, given
//! read access to the membership view and the capacity table.

use super::capacity::{CapacityEntry, CapacityTable};
use super::notification::NotificationListener;
use crate::executor::types::Work;
use crate::membership::types::NodeId;
use crate::membership::view::MembershipView;

use std::sync::Arc;

/// Read-only window on the work manager's cluster state.
#[derive(Clone, Copy)]
pub struct ClusterView<'a> {
    members: &'a MembershipView,
    capacity: &'a CapacityTable,
}

impl<'a> ClusterView<'a> {
    pub fn new(members: &'a MembershipView, capacity: &'a CapacityTable) -> Self {
        Self { members, capacity }
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.members.members()
    }

    pub fn peers(&self, local: &NodeId) -> Vec<NodeId> {
        self.members.peers(local)
    }

    pub fn capacity(&self, node: &NodeId) -> Option<CapacityEntry> {
        self.capacity.get(node)
    }
}

pub trait Selector: Send + Sync {
    /// `None` means no suitable peer; the work then runs locally.
    fn select(&self, local: &NodeId, work: &Work, cluster: &ClusterView<'_>) -> Option<NodeId>;

    /// Capability check: selectors that track cluster events return themselves.
    fn as_listener(self: Arc<Self>) -> Option<Arc<dyn NotificationListener>> {
        None
    }
}

/// First peer, in id order, reporting a free worker in the relevant pool.
#[derive(Debug, Default)]
pub struct FirstAvailable;

impl Selector for FirstAvailable {
    fn select(&self, local: &NodeId, work: &Work, cluster: &ClusterView<'_>) -> Option<NodeId> {
        cluster.peers(local).into_iter().find(|peer| {
            cluster
                .capacity(peer)
                .is_some_and(|entry| entry.free(work.long_running) > 0)
        })
    }
}

/// Peer with the most free workers in the relevant pool; ties go to the lower id.
#[derive(Debug, Default)]
pub struct MaxFreeWorkers;

impl Selector for MaxFreeWorkers {
    fn select(&self, local: &NodeId, work: &Work, cluster: &ClusterView<'_>) -> Option<NodeId> {
        cluster
            .peers(local)
            .into_iter()
            .filter_map(|peer| {
                let free = cluster.capacity(&peer)?.free(work.long_running);
                (free > 0).then_some((peer, free))
            })
            .fold(None, |best: Option<(NodeId, u64)>, (peer, free)| match best {
                Some((_, best_free)) if best_free >= free => best,
                _ => Some((peer, free)),
            })
            .map(|(peer, _)| peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> (MembershipView, CapacityTable) {
        let members = MembershipView::new();
        let capacity = CapacityTable::new();
        for (id, short, long) in [("a", 5, 0), ("b", 0, 1), ("c", 2, 3), ("d", 2, 0)] {
            let node = NodeId::from(id);
            members.insert(&node);
            capacity.update_free(&node, short, long);
        }
        (members, capacity)
    }

    #[test]
    fn test_first_available_skips_local_and_busy_peers() {
        let (members, capacity) = cluster();
        let view = ClusterView::new(&members, &capacity);
        let short = Work::new("noop", serde_json::Value::Null);
        let long = Work::new("noop", serde_json::Value::Null).long_running();

        assert_eq!(
            FirstAvailable.select(&NodeId::from("a"), &short, &view),
            Some(NodeId::from("c"))
        );
        assert_eq!(
            FirstAvailable.select(&NodeId::from("a"), &long, &view),
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn test_max_free_workers() {
        let (members, capacity) = cluster();
        let view = ClusterView::new(&members, &capacity);
        let short = Work::new("noop", serde_json::Value::Null);
        let long = Work::new("noop", serde_json::Value::Null).long_running();

        assert_eq!(
            MaxFreeWorkers.select(&NodeId::from("b"), &short, &view),
            Some(NodeId::from("a"))
        );
        // c and d tie on short-running capacity from a's point of view
        assert_eq!(
            MaxFreeWorkers.select(&NodeId::from("a"), &short, &view),
            Some(NodeId::from("c"))
        );
        assert_eq!(
            MaxFreeWorkers.select(&NodeId::from("c"), &long, &view),
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn test_no_peer_with_capacity() {
        let members = MembershipView::new();
        let capacity = CapacityTable::new();
        let local = NodeId::from("local");
        let peer = NodeId::from("peer");
        members.insert(&local);
        members.insert(&peer);
        capacity.register(&peer);

        let view = ClusterView::new(&members, &capacity);
        let work = Work::new("noop", serde_json::Value::Null);

        assert!(FirstAvailable.select(&local, &work, &view).is_none());
        assert!(MaxFreeWorkers.select(&local, &work, &view).is_none());
    }
}
