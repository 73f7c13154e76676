use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP service port shared by every node on a LAN.
pub const DEFAULT_PORT: u16 = 5000;

/// Runtime settings for one node.
///
/// Timings default to the protocol's standard values; tests shrink them to
/// keep runs fast.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port this node binds. Peers are addressed at whatever source address
    /// their datagrams arrive from, so nodes on one LAN normally share this.
    pub port: u16,
    /// Destination for heartbeat announcements.
    pub broadcast: SocketAddr,
    pub heartbeat_interval: Duration,
    /// Peers silent for longer than this are dropped from the table.
    pub peer_timeout: Duration,
    /// How long one attempt waits for an ACK before retrying.
    pub ack_timeout: Duration,
    /// Pause between attempts of an acknowledged send.
    pub retry_pause: Duration,
    /// Total attempts for an acknowledged send.
    pub max_attempts: u32,
    /// Directory received files are written into.
    pub download_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)),
                DEFAULT_PORT,
            ),
            heartbeat_interval: Duration::from_secs(25),
            peer_timeout: Duration::from_secs(120),
            ack_timeout: Duration::from_secs(2),
            retry_pause: Duration::from_secs(1),
            max_attempts: 10,
            download_dir: PathBuf::from("."),
        }
    }
}
