//! Admission Policies
//!
//! A policy answers one question: may this work leave the node? Only simple
//! reference policies live here; smarter ones plug in through [`Policy`].

use super::notification::NotificationListener;
use crate::executor::types::Work;
use crate::membership::types::NodeId;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait Policy: Send + Sync {
    fn should_distribute(&self, work: &Work) -> bool;

    /// Capability check: policies that track cluster events return themselves.
    fn as_listener(self: Arc<Self>) -> Option<Arc<dyn NotificationListener>> {
        None
    }
}

/// Distributes every distributable work.
#[derive(Debug, Default)]
pub struct Always;

impl Policy for Always {
    fn should_distribute(&self, _work: &Work) -> bool {
        true
    }
}

/// Keeps everything local.
#[derive(Debug, Default)]
pub struct Never;

impl Policy for Never {
    fn should_distribute(&self, _work: &Work) -> bool {
        false
    }
}

/// Distributes once the local node's free workers in the relevant pool have
/// dropped to the watermark or below.
///
/// The local free counts are learned from the capacity notifications the
/// work manager fans out, including the ones about the local node itself.
#[derive(Debug)]
pub struct WaterMark {
    local: NodeId,
    watermark: u64,
    short_running_free: AtomicU64,
    long_running_free: AtomicU64,
}

impl WaterMark {
    pub fn new(local: NodeId, watermark: u64) -> Self {
        Self {
            local,
            watermark,
            short_running_free: AtomicU64::new(u64::MAX),
            long_running_free: AtomicU64::new(u64::MAX),
        }
    }
}

impl Policy for WaterMark {
    fn should_distribute(&self, work: &Work) -> bool {
        let free = if work.long_running {
            self.long_running_free.load(Ordering::Relaxed)
        } else {
            self.short_running_free.load(Ordering::Relaxed)
        };
        free <= self.watermark
    }

    fn as_listener(self: Arc<Self>) -> Option<Arc<dyn NotificationListener>> {
        Some(self)
    }
}

impl NotificationListener for WaterMark {
    fn update_short_running_free(&self, node: &NodeId, free: u64) {
        if *node == self.local {
            self.short_running_free.store(free, Ordering::Relaxed);
        }
    }

    fn update_long_running_free(&self, node: &NodeId, free: u64) {
        if *node == self.local {
            self.long_running_free.store(free, Ordering::Relaxed);
        }
    }
}
