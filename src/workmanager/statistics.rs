//! Replicated Statistics
//!
//! Each node is the only writer of its own eight counters. Every local
//! increment is broadcast as a one-way delta; peers add one to their cached
//! copy of the origin's counter. Counters only grow, so applying deltas in any
//! order converges as long as none are lost. A lost delta is never resent.

use super::notification::NotificationListener;
use crate::membership::types::NodeId;
use crate::transport::Transport;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const COUNTER_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    DoWorkAccepted,
    DoWorkRejected,
    StartWorkAccepted,
    StartWorkRejected,
    ScheduleWorkAccepted,
    ScheduleWorkRejected,
    WorkSuccessful,
    WorkFailed,
}

impl Counter {
    pub const ALL: [Counter; COUNTER_COUNT] = [
        Counter::DoWorkAccepted,
        Counter::DoWorkRejected,
        Counter::StartWorkAccepted,
        Counter::StartWorkRejected,
        Counter::ScheduleWorkAccepted,
        Counter::ScheduleWorkRejected,
        Counter::WorkSuccessful,
        Counter::WorkFailed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Values of all eight counters for one node or for the whole cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub do_work_accepted: u64,
    pub do_work_rejected: u64,
    pub start_work_accepted: u64,
    pub start_work_rejected: u64,
    pub schedule_work_accepted: u64,
    pub schedule_work_rejected: u64,
    pub work_successful: u64,
    pub work_failed: u64,
}

impl StatisticsSnapshot {
    pub fn from_values(values: [u64; COUNTER_COUNT]) -> Self {
        Self {
            do_work_accepted: values[0],
            do_work_rejected: values[1],
            start_work_accepted: values[2],
            start_work_rejected: values[3],
            schedule_work_accepted: values[4],
            schedule_work_rejected: values[5],
            work_successful: values[6],
            work_failed: values[7],
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::DoWorkAccepted => self.do_work_accepted,
            Counter::DoWorkRejected => self.do_work_rejected,
            Counter::StartWorkAccepted => self.start_work_accepted,
            Counter::StartWorkRejected => self.start_work_rejected,
            Counter::ScheduleWorkAccepted => self.schedule_work_accepted,
            Counter::ScheduleWorkRejected => self.schedule_work_rejected,
            Counter::WorkSuccessful => self.work_successful,
            Counter::WorkFailed => self.work_failed,
        }
    }
}

pub struct ReplicatedStatistics {
    local_id: NodeId,
    enabled: AtomicBool,
    local: [AtomicU64; COUNTER_COUNT],
    peers: DashMap<NodeId, [u64; COUNTER_COUNT]>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl ReplicatedStatistics {
    pub fn new(local_id: NodeId, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            enabled: AtomicBool::new(enabled),
            local: Default::default(),
            peers: DashMap::new(),
            transport: RwLock::new(None),
        })
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Increments a local counter and broadcasts the delta when enabled.
    pub fn record(&self, counter: Counter) {
        self.local[counter.index()].fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() {
            return;
        }

        let transport = self.transport.read().clone();
        if let Some(transport) = transport {
            transport.send_delta(&self.local_id, counter);
        }
    }

    pub fn local(&self) -> StatisticsSnapshot {
        StatisticsSnapshot::from_values(self.local_values())
    }

    /// This node's view of `node`'s counters.
    pub fn node(&self, node: &NodeId) -> Option<StatisticsSnapshot> {
        if *node == self.local_id {
            return Some(self.local());
        }
        self.peers
            .get(node)
            .map(|values| StatisticsSnapshot::from_values(*values.value()))
    }

    /// Nodes with counters known here, local node included.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        nodes.push(self.local_id.clone());
        nodes.sort();
        nodes
    }

    /// Own values plus the cached copies of every known peer.
    pub fn aggregate(&self) -> StatisticsSnapshot {
        let mut total = self.local_values();
        for entry in self.peers.iter() {
            for (sum, value) in total.iter_mut().zip(entry.value().iter()) {
                *sum += value;
            }
        }
        StatisticsSnapshot::from_values(total)
    }

    fn local_values(&self) -> [u64; COUNTER_COUNT] {
        std::array::from_fn(|i| self.local[i].load(Ordering::Relaxed))
    }
}

impl NotificationListener for ReplicatedStatistics {
    fn leave(&self, node: &NodeId) {
        if self.peers.remove(node).is_some() {
            tracing::debug!("Dropped cached statistics of {:?}", node);
        }
    }

    fn delta(&self, origin: &NodeId, counter: Counter) {
        if *origin == self.local_id {
            return;
        }
        self.peers
            .entry(origin.clone())
            .or_insert([0; COUNTER_COUNT])[counter.index()] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_indices_are_dense() {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), i);
        }
    }

    #[test]
    fn test_record_without_transport_counts_locally() {
        let stats = ReplicatedStatistics::new(NodeId::from("local"), true);

        stats.record(Counter::DoWorkAccepted);
        stats.record(Counter::DoWorkAccepted);
        stats.record(Counter::WorkFailed);

        let local = stats.local();
        assert_eq!(local.do_work_accepted, 2);
        assert_eq!(local.work_failed, 1);
        assert_eq!(local.get(Counter::StartWorkRejected), 0);
    }

    #[test]
    fn test_deltas_build_peer_copies_and_aggregate() {
        let stats = ReplicatedStatistics::new(NodeId::from("local"), true);
        let peer = NodeId::from("peer");

        stats.record(Counter::ScheduleWorkAccepted);
        stats.delta(&peer, Counter::ScheduleWorkAccepted);
        stats.delta(&peer, Counter::ScheduleWorkAccepted);
        stats.delta(&peer, Counter::WorkSuccessful);

        assert_eq!(stats.node(&peer).unwrap().schedule_work_accepted, 2);
        assert_eq!(stats.aggregate().schedule_work_accepted, 3);
        assert_eq!(stats.aggregate().work_successful, 1);
        assert_eq!(stats.nodes().len(), 2);
    }

    #[test]
    fn test_own_delta_echo_is_ignored() {
        let local = NodeId::from("local");
        let stats = ReplicatedStatistics::new(local.clone(), true);

        stats.record(Counter::DoWorkRejected);
        stats.delta(&local, Counter::DoWorkRejected);

        assert_eq!(stats.aggregate().do_work_rejected, 1);
    }

    #[test]
    fn test_leave_discards_peer_copy() {
        let stats = ReplicatedStatistics::new(NodeId::from("local"), true);
        let peer = NodeId::from("peer");

        stats.delta(&peer, Counter::WorkFailed);
        stats.leave(&peer);

        assert!(stats.node(&peer).is_none());
        assert_eq!(stats.aggregate().work_failed, 0);
    }
}
