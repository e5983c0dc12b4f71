//! Remote Transport Module
//!
//! Moves work-manager operations between nodes.
//!
//! ## Submodules
//! - **`protocol`**: the numeric operation-id table and per-operation codecs.
//! - **`channel`**: the group-communication substrate contract.
//! - **`remote`**: [`Transport`] implemented on top of any substrate.
//! - **`udp`**: substrate over UDP with gossip membership.
//! - **`loopback`**: in-process substrate for tests and simulations.

pub mod channel;
pub mod loopback;
pub mod protocol;
pub mod remote;
pub mod udp;


use crate::error::WorkError;
use crate::executor::types::Work;
use crate::membership::types::NodeId;
use crate::workmanager::manager::DistributedWorkManager;
use crate::workmanager::notification::NotificationListener;
use crate::workmanager::statistics::Counter;

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Operations the work manager issues towards other nodes.
///
/// Request/response operations honour the configured call timeout. The
/// capacity updates and statistics deltas are one-way broadcasts: they return
/// immediately and delivery is best-effort.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Gives the transport the manager that serves inbound requests.
    fn attach(&self, manager: Weak<DistributedWorkManager>);

    /// Capability check: transports that track cluster events return themselves.
    fn as_listener(self: Arc<Self>) -> Option<Arc<dyn NotificationListener>> {
        None
    }

    /// Connects to the group and announces this node.
    async fn start(&self) -> Result<(), WorkError>;

    /// Announces departure and disconnects.
    async fn stop(&self);

    async fn ping(&self, node: &NodeId) -> Result<Duration, WorkError>;

    async fn do_work(&self, node: &NodeId, work: Work) -> Result<(), WorkError>;

    /// Returns the remote start delay in ms.
    async fn start_work(&self, node: &NodeId, work: Work) -> Result<u64, WorkError>;

    async fn schedule_work(&self, node: &NodeId, work: Work) -> Result<(), WorkError>;

    async fn get_short_running_free(&self, node: &NodeId) -> Result<u64, WorkError>;

    async fn get_long_running_free(&self, node: &NodeId) -> Result<u64, WorkError>;

    fn update_short_running_free(&self, node: &NodeId, free: u64);

    fn update_long_running_free(&self, node: &NodeId, free: u64);

    fn send_delta(&self, origin: &NodeId, counter: Counter);
}
