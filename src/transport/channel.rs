//! Group-Communication Substrate Contract
//!
//! What the remote transport needs from the network underneath it: addressed
//! request/response and one-way delivery, and notifications carrying the full
//! member list whenever the group changes.

use crate::error::ChannelError;
use crate::membership::types::NodeId;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Bounds every substrate address type must satisfy.
pub trait Address:
    Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Address for T where
    T: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Receives traffic delivered by a channel.
#[async_trait]
pub trait InboundHandler<A>: Send + Sync {
    /// Handles a request and produces the reply bytes.
    async fn on_request(&self, op: u16, body: Vec<u8>) -> Result<Vec<u8>, ChannelError>;

    /// Delivers the complete current member list, local node included.
    fn on_view(&self, members: Vec<(NodeId, A)>);
}

#[async_trait]
pub trait GroupChannel: Send + Sync + 'static {
    type Address: Address;

    fn local_id(&self) -> NodeId;

    fn local_address(&self) -> Self::Address;

    /// Starts delivering requests and view changes to `handler`.
    async fn connect(&self, handler: Arc<dyn InboundHandler<Self::Address>>)
    -> Result<(), ChannelError>;

    async fn close(&self);

    /// Sends a request and waits at most `timeout` for the reply bytes.
    async fn send_request(
        &self,
        target: &Self::Address,
        op: u16,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError>;

    /// Sends without waiting for any reply.
    async fn send_one_way(
        &self,
        target: &Self::Address,
        op: u16,
        body: Vec<u8>,
    ) -> Result<(), ChannelError>;

    /// Best-effort one-way delivery to every target; failures are logged.
    async fn send_broadcast(&self, targets: &[Self::Address], op: u16, body: Vec<u8>) {
        for target in targets {
            if let Err(e) = self.send_one_way(target, op, body.clone()).await {
                tracing::warn!("Broadcast of op {} to {} failed: {}", op, target, e);
            }
        }
    }
}
