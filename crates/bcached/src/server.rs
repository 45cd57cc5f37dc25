//! bcached server - UDP gossip loop

use crate::config::Config;
use crate::node::{Gossiper, Node, NodeError};
use bcache_core::{Batch, GossipData, PeerName};
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Largest datagram we send: the IPv4 UDP payload limit
pub const MAX_DATAGRAM: usize = 65_507;

/// Receive buffer size
const RECV_BUFFER: usize = 64 * 1024;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Core error: {0}")]
    Core(#[from] bcache_core::Error),
    #[error("Empty datagram")]
    EmptyFrame,
    #[error("Unknown frame type: {0}")]
    UnknownFrame(u8),
}

/// Frame types, carried in the first byte of each datagram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Periodic full-state round
    Gossip = 1,
    /// Flooded delta
    Broadcast = 2,
}

impl TryFrom<u8> for FrameType {
    type Error = ServerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Gossip),
            2 => Ok(Self::Broadcast),
            other => Err(ServerError::UnknownFrame(other)),
        }
    }
}

/// Prefix an encoded batch with its frame type
pub fn encode_frame(frame_type: FrameType, batch: &Batch) -> Result<Vec<u8>, ServerError> {
    let payload = batch.encode()?;
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(frame_type as u8);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encode `batch` as frames of at most `max_len` bytes each.
///
/// Batches that do not fit are split in half until every part does. A single
/// entry too large for any frame is dropped with a warning.
pub fn encode_frames(
    frame_type: FrameType,
    batch: Batch,
    max_len: usize,
) -> Result<Vec<Vec<u8>>, ServerError> {
    let mut frames = Vec::new();
    let mut work = vec![batch];
    while let Some(batch) = work.pop() {
        let frame = encode_frame(frame_type, &batch)?;
        if frame.len() <= max_len {
            frames.push(frame);
        } else if batch.len() > 1 {
            let (left, right) = split_batch(batch);
            work.push(left);
            work.push(right);
        } else {
            warn!(
                "Dropping {} byte entry {:?}: larger than a {} byte frame",
                frame.len(),
                batch.keys().next(),
                max_len
            );
        }
    }
    Ok(frames)
}

fn split_batch(batch: Batch) -> (Batch, Batch) {
    let origin = batch.origin;
    let mut entries: Vec<_> = batch.entries.into_iter().collect();
    let right = entries.split_off(entries.len() / 2);
    (
        Batch {
            origin,
            entries: entries.into_iter().collect(),
        },
        Batch {
            origin,
            entries: right.into_iter().collect(),
        },
    )
}

/// Split a datagram into frame type and payload
pub fn decode_frame(datagram: &[u8]) -> Result<(FrameType, &[u8]), ServerError> {
    let (&tag, payload) = datagram.split_first().ok_or(ServerError::EmptyFrame)?;
    Ok((FrameType::try_from(tag)?, payload))
}

/// Server state
pub struct Server {
    config: Config,
    node: Arc<Node>,
    socket: UdpSocket,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the gossip socket and create the local node
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let peer = PeerName::from_nickname(&config.nickname());
        let node = Arc::new(Node::new(peer, config.max_keys)?);
        let socket = UdpSocket::bind(config.listen).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            node,
            socket,
            shutdown_tx,
        })
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Address the gossip socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle that stops [`Server::run`]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the gossip loop until shutdown
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            "Starting bcached on {} (peer: {}, {} static peers)",
            self.local_addr()?,
            self.node.peer(),
            self.config.peers.len()
        );

        let mut ticker = interval(Duration::from_millis(self.config.gossip_interval_ms));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            if let Err(e) = self.handle_datagram(&buf[..len], from).await {
                                warn!("Dropping datagram from {}: {}", from, e);
                            }
                        }
                        Err(e) => warn!("Receive error: {}", e),
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.gossip_round().await {
                        warn!("Gossip round failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) -> Result<(), ServerError> {
        let (frame_type, payload) = decode_frame(datagram)?;
        let relay = match frame_type {
            FrameType::Gossip => Some(self.node.on_gossip(payload)?).filter(|d| !d.is_empty()),
            FrameType::Broadcast => self.node.on_gossip_broadcast(payload)?,
        };

        match relay {
            Some(delta) => {
                debug!("Relaying {} new keys from {}", delta.len(), from);
                self.send_to_peers(FrameType::Broadcast, delta, Some(from))
                    .await
            }
            None => {
                debug!("Nothing new from {}, not relaying", from);
                Ok(())
            }
        }
    }

    /// Push full state to a random subset of peers, then flush local writes
    async fn gossip_round(&self) -> Result<(), ServerError> {
        // Drained even without peers so the queue cannot build up
        let pending = self.node.drain_pending();
        if self.config.peers.is_empty() {
            return Ok(());
        }

        let state = self.node.gossip();
        if !state.is_empty() {
            let frames = encode_frames(FrameType::Gossip, state, MAX_DATAGRAM)?;
            let targets: Vec<SocketAddr> = self
                .config
                .peers
                .choose_multiple(&mut rand::thread_rng(), self.config.fanout)
                .copied()
                .collect();
            for target in targets {
                for frame in &frames {
                    self.send_frame(frame, target).await;
                }
            }
        }

        if let Some(pending) = pending {
            self.send_to_peers(FrameType::Broadcast, pending, None).await?;
        }
        Ok(())
    }

    async fn send_to_peers(
        &self,
        frame_type: FrameType,
        batch: Batch,
        except: Option<SocketAddr>,
    ) -> Result<(), ServerError> {
        let frames = encode_frames(frame_type, batch, MAX_DATAGRAM)?;
        for target in self.config.peers.iter().filter(|p| Some(**p) != except) {
            for frame in &frames {
                self.send_frame(frame, *target).await;
            }
        }
        Ok(())
    }

    async fn send_frame(&self, frame: &[u8], target: SocketAddr) {
        if let Err(e) = self.socket.send_to(frame, target).await {
            warn!("Send to {} failed: {}", target, e);
        }
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
