//! Membership View
//!
//! The set of node ids the work manager currently knows about. It is only
//! mutated from join/leave notifications delivered by the transport.

use super::types::NodeId;

use parking_lot::RwLock;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct MembershipView {
    members: RwLock<BTreeSet<NodeId>>,
}

impl MembershipView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the member was not known before.
    pub fn insert(&self, node: &NodeId) -> bool {
        self.members.write().insert(node.clone())
    }

    /// Returns `true` if the member was known.
    pub fn remove(&self, node: &NodeId) -> bool {
        self.members.write().remove(node)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.members.read().contains(node)
    }

    /// All members in id order, including the local node.
    pub fn members(&self) -> Vec<NodeId> {
        self.members.read().iter().cloned().collect()
    }

    /// All members except `local`, in id order.
    pub fn peers(&self, local: &NodeId) -> Vec<NodeId> {
        self.members
            .read()
            .iter()
            .filter(|id| *id != local)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}
