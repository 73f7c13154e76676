//! # Node Runtime
//!
//! One node is a bound UDP socket, a dispatch loop, and the shared state the
//! front end acts through. The loop multiplexes inbound datagrams with the
//! heartbeat and reaper timers; outbound operations run on the caller's task
//! against the same socket.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lanlink_common::config::Config;
use lanlink_common::peer::Peer;
use lanlink_protocols::frame::MAX_DATAGRAM;
use lanlink_protocols::{Frame, ident};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::delivery::{self, AckOutcome, AckRegistry, Delivery};
use crate::discovery::{self, PeerTable};
use crate::events::NodeEvent;
use crate::transfer::{self, InboundTransfers, TransferOutcome};

/// Interval at which silent peers are checked for expiry.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running node. Cheap to clone; the dispatch loop stops on
/// [`NodeHandle::shutdown`] or once every clone is dropped.
#[derive(Clone)]
pub struct NodeHandle {
    name: Arc<str>,
    socket: Arc<UdpSocket>,
    peers: Arc<PeerTable>,
    acks: Arc<AckRegistry>,
    config: Arc<Config>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Binds the socket, spawns the dispatch loop, and returns the handle plus
/// the stream of user-visible events.
pub async fn spawn(
    name: &str,
    config: Config,
) -> anyhow::Result<(NodeHandle, mpsc::UnboundedReceiver<NodeEvent>)> {
    let socket = UdpSocket::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding UDP port {}", config.port))?;
    socket.set_broadcast(true).context("enabling broadcast")?;

    info!("node {name} listening on port {}", config.port);

    let socket = Arc::new(socket);
    let peers = Arc::new(PeerTable::new());
    let acks = Arc::new(AckRegistry::new());
    let config = Arc::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let handle = NodeHandle {
        name: Arc::from(name),
        socket: socket.clone(),
        peers: peers.clone(),
        acks: acks.clone(),
        config: config.clone(),
        shutdown: Arc::new(shutdown_tx),
    };

    let dispatcher = Dispatcher {
        name: handle.name.clone(),
        inbound: InboundTransfers::new(config.download_dir.clone()),
        seen_talk: HashSet::new(),
        socket,
        peers,
        acks,
        config,
        events: events_tx,
    };
    tokio::spawn(dispatcher.run(shutdown_rx));

    Ok((handle, events_rx))
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current peers, sorted by name.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.snapshot()
    }

    /// Sends an acknowledged text message to a named peer.
    pub async fn talk(&self, peer: &str, body: &str) -> anyhow::Result<Delivery> {
        let addr = self.peer_addr(peer)?;
        let id = ident::message_id(&self.name);
        let frame = Frame::Talk {
            id: id.clone(),
            body: body.to_string(),
        };
        delivery::send_acknowledged(&self.socket, addr, &frame, &id, &self.acks, &self.config)
            .await
    }

    /// Transfers a file to a named peer. `progress` observes
    /// `(chunks delivered, chunks total)`.
    pub async fn send_file(
        &self,
        peer: &str,
        path: &Path,
        progress: impl Fn(u32, u32),
    ) -> anyhow::Result<TransferOutcome> {
        let addr = self.peer_addr(peer)?;
        transfer::send_file(
            &self.socket,
            &self.acks,
            &self.config,
            &self.name,
            addr,
            path,
            progress,
        )
        .await
    }

    /// Stops the dispatch loop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn peer_addr(&self, peer: &str) -> anyhow::Result<SocketAddr> {
        self.peers
            .lookup(peer)
            .with_context(|| format!("unknown peer `{peer}`"))
    }
}

struct Dispatcher {
    name: Arc<str>,
    socket: Arc<UdpSocket>,
    peers: Arc<PeerTable>,
    acks: Arc<AckRegistry>,
    config: Arc<Config>,
    inbound: InboundTransfers,
    seen_talk: HashSet<String>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl Dispatcher {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut reaper = tokio::time::interval(REAP_INTERVAL);
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, addr)) => self.dispatch(&buffer[..len], addr).await,
                        Err(e) => warn!("receive error: {e}"),
                    }
                }

                _ = heartbeat.tick() => {
                    discovery::announce(&self.socket, &self.name, self.config.broadcast).await;
                }

                _ = reaper.tick() => self.reap(),

                changed = shutdown.changed() => {
                    // Err means every handle is gone; stop either way.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("dispatch loop for {} stopped", self.name);
    }

    /// A bad datagram never takes the loop down; it is logged and dropped.
    async fn dispatch(&mut self, raw: &[u8], addr: SocketAddr) {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(_) => {
                debug!("non-UTF-8 datagram from {addr}");
                return;
            }
        };
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("unparseable datagram from {addr}: {e}");
                return;
            }
        };

        match frame {
            Frame::Heartbeat { name } => {
                // Our own broadcasts loop back; drop them by name.
                if name.as_str() != &*self.name {
                    self.peers.observe(&name, addr);
                }
            }

            Frame::Ack { id } => {
                if !self.acks.complete(&id, AckOutcome::Ack) {
                    debug!("ACK for {id} had no waiter");
                }
            }

            Frame::Nack { id, reason } => {
                if !self.acks.complete(&id, AckOutcome::Nack(reason.clone())) {
                    debug!("NACK for {id} ({reason}) had no waiter");
                }
            }

            Frame::Talk { id, body } => self.accept_talk(id, body, addr).await,

            Frame::File { id, name, size } => {
                let origin = self.origin_of(addr);
                let (reply, event) = self.inbound.offer(&id, &name, size, origin);
                self.reply(reply, addr).await;
                if let Some(event) = event {
                    let _ = self.events.send(event);
                }
            }

            Frame::Chunk { id, seq, data } => {
                if let Some(reply) = self.inbound.store(&id, seq, data) {
                    self.reply(reply, addr).await;
                }
            }

            Frame::End { id, hash } => self.finish_transfer(id, hash, addr),
        }
    }

    async fn accept_talk(&mut self, id: String, body: String, addr: SocketAddr) {
        if self.seen_talk.insert(id.clone()) {
            let from = self.origin_of(addr);
            let _ = self.events.send(NodeEvent::Message { from, body });
        } else {
            debug!("duplicate TALK {id}, re-acking");
        }
        // Ack duplicates too: our first ack may not have made it back.
        self.reply(Frame::Ack { id }, addr).await;
    }

    /// Assembly touches the disk, so it runs off the dispatch loop; the reply
    /// is sent once the hash check is done.
    fn finish_transfer(&mut self, id: String, expected_hash: String, addr: SocketAddr) {
        let Some(job) = self.inbound.finish(&id, expected_hash) else {
            debug!("END for unknown transfer {id}");
            return;
        };

        let socket = self.socket.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let (reply, event) = match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("transfer assembly task failed: {e}");
                    return;
                }
            };
            if let Err(e) = socket.send_to(reply.encode().as_bytes(), addr).await {
                warn!("failed to send transfer reply to {addr}: {e}");
            }
            let _ = events.send(event);
        });
    }

    fn reap(&self) {
        for peer in self.peers.prune(self.config.peer_timeout) {
            info!("peer {} at {} timed out", peer.name, peer.addr);
            let _ = self.events.send(NodeEvent::PeerLost { name: peer.name });
        }
    }

    async fn reply(&self, frame: Frame, addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(frame.encode().as_bytes(), addr).await {
            warn!("failed to reply to {addr}: {e}");
        }
    }

    fn origin_of(&self, addr: SocketAddr) -> String {
        self.peers
            .attribute(addr)
            .unwrap_or_else(|| addr.to_string())
    }
}
