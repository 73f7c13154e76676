//! # Peer Model
//!
//! A peer is another node heard from on the network, keyed by the name it
//! announces in its heartbeats.

use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    /// Source address of the peer's last heartbeat. Replies and unicast
    /// frames go here.
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(name: String, addr: SocketAddr) -> Self {
        Self {
            name,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Whole seconds since this peer was last heard from.
    pub fn seen_secs_ago(&self) -> u64 {
        self.last_seen.elapsed().as_secs()
    }
}
