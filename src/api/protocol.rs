//! HTTP API Protocol
//!
//! Endpoints served by every node and the JSON bodies they exchange. The
//! dashboard in the `ui` crate speaks the same shapes.

use crate::executor::types::WorkId;
use crate::membership::types::NodeId;
use crate::workmanager::capacity::CapacityEntry;
use crate::workmanager::statistics::StatisticsSnapshot;

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Runs a work and answers once it has completed.
pub const ENDPOINT_DO_WORK: &str = "/work/do";
/// Answers once the work has started.
pub const ENDPOINT_START_WORK: &str = "/work/start";
/// Answers once the work has been accepted.
pub const ENDPOINT_SCHEDULE_WORK: &str = "/work/schedule";
pub const ENDPOINT_STATS: &str = "/stats";
pub const ENDPOINT_CAPACITY: &str = "/capacity";
pub const ENDPOINT_MEMBERS: &str = "/members";
/// Followed by `/:node`.
pub const ENDPOINT_PING: &str = "/ping";

// --- Data Transfer Objects ---

/// Outcome of one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitWorkResponse {
    pub work_id: WorkId,
    pub accepted: bool,
    /// Only set by `/work/start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatistics {
    pub node: NodeId,
    pub counters: StatisticsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub local_node: NodeId,
    pub replication_enabled: bool,
    /// Sum over every node known here.
    pub aggregate: StatisticsSnapshot,
    pub nodes: Vec<NodeStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityResponse {
    pub entries: Vec<CapacityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub local_node: NodeId,
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_micros: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
