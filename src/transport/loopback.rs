//! In-Process Substrate
//!
//! All channels created from one [`LoopbackNetwork`] see each other. Every
//! connect or close publishes the full member list to everyone connected.
//! Delivery can be slowed per receiving node and nodes can be isolated, which
//! makes timeouts and unreachable peers reproducible without sockets.

use super::channel::{GroupChannel, InboundHandler};
use crate::error::ChannelError;
use crate::membership::types::NodeId;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct LoopbackNetwork {
    handlers: DashMap<String, Arc<dyn InboundHandler<String>>>,
    delays: DashMap<String, Duration>,
    isolated: DashSet<String>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a channel whose node id and address are both `name`.
    pub fn channel(self: &Arc<Self>, name: &str) -> Arc<LoopbackChannel> {
        Arc::new(LoopbackChannel {
            network: self.clone(),
            id: NodeId::from(name),
            address: name.to_string(),
        })
    }

    /// Every request delivered to `name` waits `delay` before it is handled.
    pub fn set_delay(&self, name: &str, delay: Duration) {
        self.delays.insert(name.to_string(), delay);
    }

    /// Drops all traffic to and from `name` without changing the views.
    pub fn isolate(&self, name: &str) {
        self.isolated.insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.isolated.remove(name);
    }

    pub fn connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn delay(&self, name: &str) -> Duration {
        self.delays.get(name).map(|d| *d.value()).unwrap_or_default()
    }

    fn route(&self, from: &str, to: &str) -> Result<Arc<dyn InboundHandler<String>>, ChannelError> {
        if self.isolated.contains(from) || self.isolated.contains(to) {
            return Err(ChannelError::Unreachable(to.to_string()));
        }
        self.handlers
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ChannelError::Unreachable(to.to_string()))
    }

    fn publish_view(&self) {
        let mut view: Vec<(NodeId, String)> = self
            .handlers
            .iter()
            .map(|entry| (NodeId::from(entry.key().as_str()), entry.key().clone()))
            .collect();
        view.sort();

        // Collected first so no map guard is held while handlers run.
        let handlers: Vec<Arc<dyn InboundHandler<String>>> =
            self.handlers.iter().map(|entry| entry.value().clone()).collect();

        for handler in handlers {
            handler.on_view(view.clone());
        }
    }
}

pub struct LoopbackChannel {
    network: Arc<LoopbackNetwork>,
    id: NodeId,
    address: String,
}

#[async_trait]
impl GroupChannel for LoopbackChannel {
    type Address = String;

    fn local_id(&self) -> NodeId {
        self.id.clone()
    }

    fn local_address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self, handler: Arc<dyn InboundHandler<String>>) -> Result<(), ChannelError> {
        self.network.handlers.insert(self.address.clone(), handler);
        tracing::debug!("Loopback node {} connected", self.address);
        self.network.publish_view();
        Ok(())
    }

    async fn close(&self) {
        if self.network.handlers.remove(&self.address).is_some() {
            tracing::debug!("Loopback node {} closed", self.address);
            self.network.publish_view();
        }
    }

    async fn send_request(
        &self,
        target: &String,
        op: u16,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        let handler = self.network.route(&self.address, target)?;
        let delay = self.network.delay(target);

        let exchange = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            handler.on_request(op, body).await
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ChannelError::Timeout(timeout))?
    }

    async fn send_one_way(&self, target: &String, op: u16, body: Vec<u8>) -> Result<(), ChannelError> {
        let handler = self.network.route(&self.address, target)?;
        let delay = self.network.delay(target);
        let target = target.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = handler.on_request(op, body).await {
                tracing::warn!("Loopback node {} failed to handle op {}: {}", target, op, e);
            }
        });
        Ok(())
    }
}
