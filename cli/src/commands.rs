use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use lanlink_common::config::{Config, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "lanlink")]
#[command(about = "Peer discovery, messaging and file transfer over UDP.")]
pub struct CommandLine {
    /// Name this node announces to the network
    #[arg(value_parser = parse_node_name)]
    pub name: String,

    /// UDP service port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address heartbeats are broadcast to
    #[arg(long, default_value = "255.255.255.255")]
    pub broadcast: IpAddr,

    /// Directory received files are written into
    #[arg(long, default_value = ".")]
    pub downloads: PathBuf,

    /// Suppress the banner
    #[arg(short, long)]
    pub quiet: bool,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_config(&self) -> Config {
        Config {
            port: self.port,
            broadcast: SocketAddr::new(self.broadcast, self.port),
            download_dir: self.downloads.clone(),
            ..Config::default()
        }
    }
}

/// Node names travel inside single-token wire fields (message ids), so
/// whitespace cannot be allowed through.
fn parse_node_name(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if raw.contains(char::is_whitespace) {
        return Err("name must not contain whitespace".to_string());
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_whitespace_in_names() {
        assert!(parse_node_name("alpha").is_ok());
        assert!(parse_node_name("two words").is_err());
        assert!(parse_node_name("").is_err());
    }
}
