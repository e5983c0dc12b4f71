//! UDP Substrate
//!
//! Work-manager traffic travels on its own socket (the member's `rpc_addr`),
//! next to the gossip socket owned by [`MembershipService`]. Each datagram is
//! a bincode-encoded [`Datagram`]; replies are matched to requests through a
//! correlation id. Membership views come from the gossip service's watch
//! channel and are handed to the transport as `(id, rpc_addr)` pairs.

use super::channel::{GroupChannel, InboundHandler};
use crate::error::ChannelError;
use crate::membership::service::MembershipService;
use crate::membership::types::NodeId;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const MAX_DATAGRAM: usize = 65507;

#[derive(Debug, Serialize, Deserialize)]
enum Datagram {
    Request {
        id: u64,
        op: u16,
        body: Vec<u8>,
        expects_reply: bool,
    },
    Reply {
        id: u64,
        result: Result<Vec<u8>, String>,
    },
}

type PendingReply = oneshot::Sender<Result<Vec<u8>, String>>;

pub struct UdpChannel {
    membership: Arc<MembershipService>,
    socket: Arc<UdpSocket>,
    local_id: NodeId,
    local_address: SocketAddr,
    next_id: AtomicU64,
    pending: Arc<DashMap<u64, PendingReply>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpChannel {
    /// Binds the RPC socket advertised by the membership service.
    pub async fn bind(membership: Arc<MembershipService>) -> anyhow::Result<Arc<Self>> {
        let socket = UdpSocket::bind(membership.local_node.rpc_addr).await?;
        let local_address = socket.local_addr()?;

        tracing::info!("RPC channel listening on {}", local_address);

        Ok(Arc::new(Self {
            local_id: membership.local_node.id.clone(),
            membership,
            socket: Arc::new(socket),
            local_address,
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    async fn send_datagram(&self, target: &SocketAddr, datagram: &Datagram) -> Result<(), ChannelError> {
        let encoded = bincode::serialize(datagram)?;
        if encoded.len() > MAX_DATAGRAM {
            return Err(ChannelError::Remote(format!(
                "datagram of {} bytes exceeds the UDP limit",
                encoded.len()
            )));
        }
        self.socket.send_to(&encoded, target).await?;
        Ok(())
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        pending: Arc<DashMap<u64, PendingReply>>,
        handler: Arc<dyn InboundHandler<SocketAddr>>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, src) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::error!("Failed to receive RPC packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            match bincode::deserialize::<Datagram>(&buf[..len]) {
                Ok(Datagram::Request {
                    id,
                    op,
                    body,
                    expects_reply,
                }) => {
                    let socket = socket.clone();
                    let handler = handler.clone();

                    tokio::spawn(async move {
                        let result = handler
                            .on_request(op, body)
                            .await
                            .map_err(|e| e.to_string());

                        if !expects_reply {
                            if let Err(e) = result {
                                tracing::warn!("One-way op {} from {} failed: {}", op, src, e);
                            }
                            return;
                        }

                        let reply = Datagram::Reply { id, result };
                        match bincode::serialize(&reply) {
                            Ok(encoded) => {
                                if let Err(e) = socket.send_to(&encoded, src).await {
                                    tracing::warn!("Failed to send reply to {}: {}", src, e);
                                }
                            }
                            Err(e) => tracing::error!("Failed to serialize reply: {}", e),
                        }
                    });
                }
                Ok(Datagram::Reply { id, result }) => match pending.remove(&id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(result);
                    }
                    None => tracing::debug!("Late reply {} from {} dropped", id, src),
                },
                Err(e) => tracing::warn!("Failed to deserialize RPC packet from {}: {}", src, e),
            }
        }
    }
}

#[async_trait]
impl GroupChannel for UdpChannel {
    type Address = SocketAddr;

    fn local_id(&self) -> NodeId {
        self.local_id.clone()
    }

    fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    async fn connect(&self, handler: Arc<dyn InboundHandler<SocketAddr>>) -> Result<(), ChannelError> {
        let receive_handle = tokio::spawn(Self::receive_loop(
            self.socket.clone(),
            self.pending.clone(),
            handler.clone(),
        ));

        let mut view_rx = self.membership.subscribe();
        let view_handle = tokio::spawn(async move {
            loop {
                let members: Vec<(NodeId, SocketAddr)> = view_rx
                    .borrow_and_update()
                    .iter()
                    .map(|node| (node.id.clone(), node.rpc_addr))
                    .collect();
                handler.on_view(members);

                if view_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        self.tasks.lock().extend([receive_handle, view_handle]);
        Ok(())
    }

    async fn close(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.pending.clear();
        tracing::info!("RPC channel on {} closed", self.local_address);
    }

    async fn send_request(
        &self,
        target: &SocketAddr,
        op: u16,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = Datagram::Request {
            id,
            op,
            body,
            expects_reply: true,
        };
        if let Err(e) = self.send_datagram(target, &request).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(message))) => Err(ChannelError::Remote(message)),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(ChannelError::Timeout(timeout))
            }
        }
    }

    async fn send_one_way(&self, target: &SocketAddr, op: u16, body: Vec<u8>) -> Result<(), ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Datagram::Request {
            id,
            op,
            body,
            expects_reply: false,
        };
        self.send_datagram(target, &request).await
    }
}
