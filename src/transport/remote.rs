//! Remote Transport
//!
//! [`Transport`] over any [`GroupChannel`]. Outbound calls resolve the target
//! node through the address book, encode the request with the operation-id
//! table and wait for the reply within the call timeout. Inbound requests are
//! decoded through the same table and served by the attached work manager.
//!
//! The address book mirrors the substrate's view: members present in a new
//! view but unknown here are joined (and asked for their free capacity).
//! Only members that an earlier view contained are processed as departures
//! when a view drops them; a member announced by a `Join` request that the
//! substrate has not reported yet stays until a view has seen it, or until
//! it sends `Leave`.

use super::Transport;
use super::channel::{GroupChannel, InboundHandler};
use super::protocol::{Reply, ReplyResult, Request, decode_reply, encode_reply};
use crate::error::{ChannelError, WorkError};
use crate::executor::types::{Work, now_ms};
use crate::membership::types::NodeId;
use crate::workmanager::manager::DistributedWorkManager;
use crate::workmanager::notification::NotificationListener;
use crate::workmanager::statistics::Counter;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub struct RemoteTransport<C: GroupChannel> {
    channel: Arc<C>,
    local_id: NodeId,
    timeout: Duration,
    address_book: DashMap<NodeId, C::Address>,
    /// Members reported by the most recent view.
    viewed: DashSet<NodeId>,
    manager: RwLock<Weak<DistributedWorkManager>>,
    me: Weak<Self>,
}

impl<C: GroupChannel> RemoteTransport<C> {
    pub fn new(channel: Arc<C>, timeout: Duration) -> Arc<Self> {
        let local_id = channel.local_id();

        Arc::new_cyclic(|me| Self {
            channel,
            local_id,
            timeout,
            address_book: DashMap::new(),
            viewed: DashSet::new(),
            manager: RwLock::new(Weak::new()),
            me: me.clone(),
        })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves a member id to its substrate address.
    pub fn resolve(&self, node: &NodeId) -> Option<C::Address> {
        self.address_book.get(node).map(|entry| entry.value().clone())
    }

    pub fn known_members(&self) -> Vec<NodeId> {
        let mut members: Vec<NodeId> = self
            .address_book
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        members.sort();
        members
    }

    fn manager(&self) -> Option<Arc<DistributedWorkManager>> {
        self.manager.read().upgrade()
    }

    fn peer_addresses(&self) -> Vec<C::Address> {
        self.address_book
            .iter()
            .filter(|entry| *entry.key() != self.local_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Unicast request/response bound by the call timeout.
    async fn call(&self, node: &NodeId, request: Request<C::Address>) -> Result<Reply, WorkError> {
        let address = self.resolve(node).ok_or_else(|| {
            WorkError::distribution(node, ChannelError::UnknownMember(node.clone()))
        })?;

        let (op, body) = request
            .encode()
            .map_err(|e| WorkError::distribution(node, e))?;

        tracing::trace!("{}: sending {:?} to {} ({})", self.local_id, op, node, address);

        let bytes = self
            .channel
            .send_request(&address, op.id(), body, self.timeout)
            .await
            .map_err(|e| WorkError::distribution(node, e))?;

        match decode_reply(&bytes).map_err(|e| WorkError::distribution(node, e))? {
            Ok(reply) => Ok(reply),
            Err(message) => Err(WorkError::distribution(node, ChannelError::Remote(message))),
        }
    }

    async fn call_value(&self, node: &NodeId, request: Request<C::Address>) -> Result<u64, WorkError> {
        match self.call(node, request).await? {
            Reply::Value(value) => Ok(value),
            Reply::Done => Err(WorkError::distribution(
                node,
                ChannelError::Remote("expected a value in reply".to_string()),
            )),
        }
    }

    /// One-way delivery to every known peer, sent in the background.
    fn broadcast(&self, request: Request<C::Address>) {
        let targets = self.peer_addresses();
        if targets.is_empty() {
            return;
        }

        let (op, body) = match request.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        let channel = self.channel.clone();
        tokio::spawn(async move {
            channel.send_broadcast(&targets, op.id(), body).await;
        });
    }

    /// Records a member; returns `true` if it was not known before.
    fn add_member(&self, node: NodeId, address: C::Address) -> bool {
        let previous = self.address_book.insert(node.clone(), address);
        if previous.is_some() {
            return false;
        }

        tracing::info!("{}: member {} joined", self.local_id, node);
        if let Some(manager) = self.manager() {
            manager.join(&node);
        }
        true
    }

    fn remove_member(&self, node: &NodeId) {
        self.viewed.remove(node);
        if self.address_book.remove(node).is_none() {
            return;
        }

        tracing::info!("{}: member {} left", self.local_id, node);
        if let Some(manager) = self.manager() {
            manager.leave(node);
        }
    }

    /// Asks a newly seen member for both of its free-worker counts.
    async fn refresh_capacity(&self, node: NodeId) {
        let Some(manager) = self.manager() else {
            return;
        };

        match self.get_short_running_free(&node).await {
            Ok(free) => manager.update_short_running_free(&node, free),
            Err(e) => tracing::warn!("Short-running capacity query to {} failed: {}", node, e),
        }

        match self.get_long_running_free(&node).await {
            Ok(free) => manager.update_long_running_free(&node, free),
            Err(e) => tracing::warn!("Long-running capacity query to {} failed: {}", node, e),
        }
    }

    async fn serve(&self, request: Request<C::Address>) -> ReplyResult {
        match request {
            Request::Join { node, address } => {
                self.add_member(node, address);
                return Ok(Reply::Done);
            }
            Request::Leave { node } => {
                self.remove_member(&node);
                return Ok(Reply::Done);
            }
            Request::Ping => return Ok(Reply::Value(now_ms())),
            _ => {}
        }

        let manager = self
            .manager()
            .ok_or_else(|| "no work manager attached".to_string())?;

        match request {
            Request::DoWork(work) => manager
                .local_do_work(work)
                .await
                .map(|_| Reply::Done)
                .map_err(|e| e.to_string()),
            Request::StartWork(work) => manager
                .local_start_work(work)
                .await
                .map(Reply::Value)
                .map_err(|e| e.to_string()),
            Request::ScheduleWork(work) => manager
                .local_schedule_work(work)
                .await
                .map(|_| Reply::Done)
                .map_err(|e| e.to_string()),
            Request::GetShortRunningFree => Ok(Reply::Value(manager.short_running_free())),
            Request::GetLongRunningFree => Ok(Reply::Value(manager.long_running_free())),
            Request::UpdateShortRunningFree { node, free } => {
                manager.update_short_running_free(&node, free);
                Ok(Reply::Done)
            }
            Request::UpdateLongRunningFree { node, free } => {
                manager.update_long_running_free(&node, free);
                Ok(Reply::Done)
            }
            Request::Delta { origin, counter } => {
                manager.delta(&origin, counter);
                Ok(Reply::Done)
            }
            Request::Join { .. } | Request::Leave { .. } | Request::Ping => Ok(Reply::Done),
        }
    }
}

#[async_trait]
impl<C: GroupChannel> InboundHandler<C::Address> for RemoteTransport<C> {
    async fn on_request(&self, op: u16, body: Vec<u8>) -> Result<Vec<u8>, ChannelError> {
        let request = Request::<C::Address>::decode(op, &body)?;
        tracing::trace!("{}: received {:?}", self.local_id, request.op_code());

        let reply = self.serve(request).await;
        encode_reply(&reply)
    }

    fn on_view(&self, members: Vec<(NodeId, C::Address)>) {
        tracing::debug!("{}: view accepted with {} members", self.local_id, members.len());

        let incoming: HashMap<NodeId, C::Address> = members.into_iter().collect();

        let departed: Vec<NodeId> = self
            .viewed
            .iter()
            .filter(|node| !incoming.contains_key(node.key()))
            .map(|node| node.key().clone())
            .collect();
        for node in departed {
            self.remove_member(&node);
        }

        for (node, address) in incoming {
            self.viewed.insert(node.clone());
            let is_peer = node != self.local_id;
            if self.add_member(node.clone(), address)
                && is_peer
                && let Some(me) = self.me.upgrade()
            {
                tokio::spawn(async move {
                    me.refresh_capacity(node).await;
                });
            }
        }
    }
}

#[async_trait]
impl<C: GroupChannel> Transport for RemoteTransport<C> {
    fn attach(&self, manager: Weak<DistributedWorkManager>) {
        *self.manager.write() = manager;
    }

    async fn start(&self) -> Result<(), WorkError> {
        let handler: Arc<dyn InboundHandler<C::Address>> = self
            .me
            .upgrade()
            .ok_or_else(|| WorkError::Configuration("transport is being dropped".to_string()))?;

        self.channel
            .connect(handler)
            .await
            .map_err(|e| WorkError::Configuration(format!("cannot connect channel: {}", e)))?;

        let address = self.channel.local_address();
        self.add_member(self.local_id.clone(), address.clone());
        self.broadcast(Request::Join {
            node: self.local_id.clone(),
            address,
        });

        tracing::info!("{}: transport started", self.local_id);
        Ok(())
    }

    async fn stop(&self) {
        let targets = self.peer_addresses();
        let leave: Request<C::Address> = Request::Leave {
            node: self.local_id.clone(),
        };
        match leave.encode() {
            Ok((op, body)) => self.channel.send_broadcast(&targets, op.id(), body).await,
            Err(e) => tracing::error!("Failed to encode leave: {}", e),
        }

        self.channel.close().await;
        self.address_book.clear();
        self.viewed.clear();
        tracing::info!("{}: transport stopped", self.local_id);
    }

    async fn ping(&self, node: &NodeId) -> Result<Duration, WorkError> {
        let started = Instant::now();
        self.call(node, Request::Ping).await?;
        Ok(started.elapsed())
    }

    async fn do_work(&self, node: &NodeId, work: Work) -> Result<(), WorkError> {
        tracing::debug!("{}: distributing doWork {} to {}", self.local_id, work.id.0, node);
        self.call(node, Request::DoWork(work)).await.map(|_| ())
    }

    async fn start_work(&self, node: &NodeId, work: Work) -> Result<u64, WorkError> {
        tracing::debug!("{}: distributing startWork {} to {}", self.local_id, work.id.0, node);
        self.call_value(node, Request::StartWork(work)).await
    }

    async fn schedule_work(&self, node: &NodeId, work: Work) -> Result<(), WorkError> {
        tracing::debug!("{}: distributing scheduleWork {} to {}", self.local_id, work.id.0, node);
        self.call(node, Request::ScheduleWork(work)).await.map(|_| ())
    }

    async fn get_short_running_free(&self, node: &NodeId) -> Result<u64, WorkError> {
        self.call_value(node, Request::GetShortRunningFree).await
    }

    async fn get_long_running_free(&self, node: &NodeId) -> Result<u64, WorkError> {
        self.call_value(node, Request::GetLongRunningFree).await
    }

    fn update_short_running_free(&self, node: &NodeId, free: u64) {
        self.broadcast(Request::UpdateShortRunningFree {
            node: node.clone(),
            free,
        });
    }

    fn update_long_running_free(&self, node: &NodeId, free: u64) {
        self.broadcast(Request::UpdateLongRunningFree {
            node: node.clone(),
            free,
        });
    }

    fn send_delta(&self, origin: &NodeId, counter: Counter) {
        self.broadcast(Request::Delta {
            origin: origin.clone(),
            counter,
        });
    }
}
