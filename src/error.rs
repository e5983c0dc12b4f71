//! Error Types
//!
//! Failures surfaced by the work manager and by the group-communication layer.

use crate::membership::types::NodeId;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a group-communication channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("unknown cluster member {0:?}")]
    UnknownMember(NodeId),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("unknown operation id {0}")]
    UnknownOperation(u16),

    #[error("channel closed")]
    Closed,

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned from the work submission entry points.
#[derive(Error, Debug)]
pub enum WorkError {
    /// The local executor refused the work (no worker became free in time).
    #[error("work rejected: {reason}")]
    Rejected { reason: String },

    /// The work was accepted but its handler returned an error.
    #[error("work failed: {0}")]
    Failed(String),

    /// Dispatch to a peer did not complete.
    #[error("distribution to {node:?} failed: {source}")]
    Distribution {
        node: NodeId,
        #[source]
        source: ChannelError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl WorkError {
    pub fn distribution(node: &NodeId, source: ChannelError) -> Self {
        WorkError::Distribution {
            node: node.clone(),
            source,
        }
    }

    pub fn is_distribution(&self) -> bool {
        matches!(self, WorkError::Distribution { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            WorkError::Distribution {
                source: ChannelError::Timeout(_),
                ..
            }
        )
    }
}
