use super::statistics::Counter;
use crate::membership::types::NodeId;

/// Capability of components that want to hear about cluster events.
///
/// Every method has an empty default so implementors pick what they need.
pub trait NotificationListener: Send + Sync {
    fn join(&self, _node: &NodeId) {}

    fn leave(&self, _node: &NodeId) {}

    fn update_short_running_free(&self, _node: &NodeId, _free: u64) {}

    fn update_long_running_free(&self, _node: &NodeId, _free: u64) {}

    /// A peer's statistics counter moved up by one.
    fn delta(&self, _origin: &NodeId, _counter: Counter) {}
}
