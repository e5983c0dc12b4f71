//! Distributed Work Manager Module
//!
//! Decides, per submitted work, whether it runs on this node or on a peer,
//! and keeps the cluster-wide bookkeeping that decision relies on.
//!
//! ## Submodules
//! - **`manager`**: the orchestrator (policy -> selector -> transport, or local).
//! - **`policy`**: pluggable admission policies and the reference ones.
//! - **`selector`**: pluggable node selectors and the reference ones.
//! - **`capacity`**: free workers per known node.
//! - **`statistics`**: the eight replicated execution counters.
//! - **`notification`**: the listener capability for cluster events.

pub mod capacity;
pub mod manager;
pub mod notification;
pub mod policy;
pub mod selector;
pub mod statistics;
