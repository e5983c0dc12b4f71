//! Membership & Discovery Module
//!
//! Cluster topology as seen by the work manager, plus the gossip protocol that
//! backs the UDP substrate.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: nodes periodically exchange member lists via UDP.
//! - **Failure Detection**: "Suspect" -> "Dead" transitions driven by timeouts.
//! - **Incarnation Numbers**: resolve disputes about a node's state.
//! - **Membership View**: the set of node ids the work manager has been told about.

pub mod service;
pub mod types;
pub mod view;

#[cfg(test)]
mod tests;
