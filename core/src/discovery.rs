//! # Presence Discovery
//!
//! Nodes find each other through periodic heartbeat broadcasts. This module
//! owns the table of peers built from those heartbeats and the announcement
//! side of the exchange.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use lanlink_common::peer::Peer;
use lanlink_protocols::Frame;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Every peer currently considered alive, keyed by announced name.
///
/// Shared between the dispatch loop (writes) and front ends (reads), so all
/// access goes through a mutex with short critical sections.
#[derive(Default)]
pub struct PeerTable {
    inner: std::sync::Mutex<HashMap<String, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a heartbeat. The latest announcement wins, so a peer that
    /// moved address is followed automatically.
    pub fn observe(&self, name: &str, addr: SocketAddr) {
        let mut table = self.inner.lock().unwrap();
        match table.get_mut(name) {
            Some(peer) => {
                peer.addr = addr;
                peer.last_seen = std::time::Instant::now();
            }
            None => {
                debug!("discovered peer {name} at {addr}");
                table.insert(name.to_string(), Peer::new(name.to_string(), addr));
            }
        }
    }

    /// Address the named peer was last heard from.
    pub fn lookup(&self, name: &str) -> Option<SocketAddr> {
        self.inner.lock().unwrap().get(name).map(|peer| peer.addr)
    }

    /// Attributes an inbound frame to a peer. An exact address match wins;
    /// otherwise any peer on the same IP is assumed (nodes on one LAN share
    /// the service port, so their source port equals it).
    pub fn attribute(&self, addr: SocketAddr) -> Option<String> {
        let table = self.inner.lock().unwrap();
        table
            .values()
            .find(|peer| peer.addr == addr)
            .or_else(|| table.values().find(|peer| peer.addr.ip() == addr.ip()))
            .map(|peer| peer.name.clone())
    }

    /// Current peers, sorted by name for stable display.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.inner.lock().unwrap().values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    /// Drops peers silent for longer than `timeout` and returns them.
    pub fn prune(&self, timeout: Duration) -> Vec<Peer> {
        let mut table = self.inner.lock().unwrap();
        let expired: Vec<String> = table
            .values()
            .filter(|peer| peer.last_seen.elapsed() > timeout)
            .map(|peer| peer.name.clone())
            .collect();
        expired
            .iter()
            .filter_map(|name| table.remove(name))
            .collect()
    }
}

/// Broadcasts one heartbeat. Send failures are logged, never fatal; the next
/// interval tick tries again.
pub async fn announce(socket: &UdpSocket, name: &str, target: SocketAddr) {
    let frame = Frame::Heartbeat {
        name: name.to_string(),
    };
    match socket.send_to(frame.encode().as_bytes(), target).await {
        Ok(_) => debug!("heartbeat sent to {target}"),
        Err(e) => warn!("failed to send heartbeat to {target}: {e}"),
    }
}
