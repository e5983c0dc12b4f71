//! Capacity Table
//!
//! Free-worker counts per known node. Entries are placement hints: the last
//! write wins and staleness is tolerated.

use crate::membership::types::NodeId;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub node: NodeId,
    pub short_running_free: u64,
    pub long_running_free: u64,
}

impl CapacityEntry {
    pub fn empty(node: &NodeId) -> Self {
        Self {
            node: node.clone(),
            short_running_free: 0,
            long_running_free: 0,
        }
    }

    pub fn free(&self, long_running: bool) -> u64 {
        if long_running {
            self.long_running_free
        } else {
            self.short_running_free
        }
    }
}

#[derive(Debug, Default)]
pub struct CapacityTable {
    entries: DashMap<NodeId, CapacityEntry>,
}

impl CapacityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zero-capacity entry unless the node is already known.
    pub fn register(&self, node: &NodeId) {
        self.entries
            .entry(node.clone())
            .or_insert_with(|| CapacityEntry::empty(node));
    }

    pub fn update_free(&self, node: &NodeId, short_running_free: u64, long_running_free: u64) {
        let mut entry = self
            .entries
            .entry(node.clone())
            .or_insert_with(|| CapacityEntry::empty(node));
        entry.short_running_free = short_running_free;
        entry.long_running_free = long_running_free;
    }

    pub fn update_short_running_free(&self, node: &NodeId, free: u64) {
        self.entries
            .entry(node.clone())
            .or_insert_with(|| CapacityEntry::empty(node))
            .short_running_free = free;
    }

    pub fn update_long_running_free(&self, node: &NodeId, free: u64) {
        self.entries
            .entry(node.clone())
            .or_insert_with(|| CapacityEntry::empty(node))
            .long_running_free = free;
    }

    pub fn get(&self, node: &NodeId) -> Option<CapacityEntry> {
        self.entries.get(node).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, node: &NodeId) -> Option<CapacityEntry> {
        self.entries.remove(node).map(|(_, entry)| entry)
    }

    /// Snapshot of all entries in node id order.
    pub fn entries(&self) -> Vec<CapacityEntry> {
        let mut entries: Vec<CapacityEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.node.cmp(&b.node));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_does_not_overwrite() {
        let table = CapacityTable::new();
        let node = NodeId::from("node-a");

        table.update_free(&node, 4, 2);
        table.register(&node);

        let entry = table.get(&node).unwrap();
        assert_eq!(entry.short_running_free, 4);
        assert_eq!(entry.long_running_free, 2);
    }

    #[test]
    fn test_partial_updates_keep_other_pool() {
        let table = CapacityTable::new();
        let node = NodeId::from("node-a");

        table.update_short_running_free(&node, 7);
        table.update_long_running_free(&node, 3);
        table.update_short_running_free(&node, 6);

        let entry = table.get(&node).unwrap();
        assert_eq!(entry.free(false), 6);
        assert_eq!(entry.free(true), 3);
    }

    #[test]
    fn test_update_free_is_idempotent_last_write_wins() {
        let table = CapacityTable::new();
        let node = NodeId::from("node-a");

        table.update_free(&node, 1, 1);
        table.update_free(&node, 5, 0);
        table.update_free(&node, 5, 0);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&node), Some(CapacityEntry {
            node: node.clone(),
            short_running_free: 5,
            long_running_free: 0,
        }));
    }

    #[test]
    fn test_remove() {
        let table = CapacityTable::new();
        let node = NodeId::from("node-a");

        table.register(&node);
        assert!(table.remove(&node).is_some());
        assert!(table.get(&node).is_none());
        assert!(table.remove(&node).is_none());
        assert!(table.is_empty());
    }
}
