//! Distributed Work Manager Library
//!
//! This library crate defines the modules that make up a cluster-aware work
//! manager. It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`workmanager`**: The orchestrator. Per submitted work it consults the admission
//!   policy and the node selector, then runs the work locally or hands it to one peer.
//!   Owns the capacity table and the replicated statistics.
//! - **`transport`**: Moves work-manager operations between nodes using a fixed
//!   numeric operation-id table over a pluggable group-communication substrate
//!   (UDP or in-process loopback).
//! - **`executor`**: The node-local side. Bounded short-running and long-running
//!   worker pools running handlers looked up by name.
//! - **`membership`**: The cluster coordination layer. A UDP-based Gossip protocol
//!   (SWIM-like) for node discovery and failure detection, plus the membership view.
//! - **`api`**: The HTTP surface of a node (submission, statistics, capacity, members).
//! - **`config`** / **`error`**: Node configuration and the typed error hierarchy.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod membership;
pub mod transport;
pub mod workmanager;

#[cfg(test)]
pub(crate) mod testing;
