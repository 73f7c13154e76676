#![cfg(test)]
//! End-to-end tests running real nodes against each other over loopback.
//!
//! Each node gets its own port and announces directly to its partner's port
//! instead of a broadcast address, so the full heartbeat / ack / transfer
//! machinery is exercised without touching the actual network.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use lanlink_common::config::Config;
use lanlink_core::delivery::Delivery;
use lanlink_core::events::NodeEvent;
use lanlink_core::node::{self, NodeHandle};
use lanlink_core::transfer::TransferOutcome;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Two configs pointed at each other, with timings shrunk for tests.
fn config_pair(port_a: u16, port_b: u16, downloads: &Path) -> (Config, Config) {
    let base = Config {
        heartbeat_interval: Duration::from_millis(50),
        peer_timeout: Duration::from_secs(10),
        ack_timeout: Duration::from_millis(250),
        retry_pause: Duration::from_millis(50),
        max_attempts: 5,
        download_dir: downloads.to_path_buf(),
        ..Config::default()
    };
    (
        Config {
            port: port_a,
            broadcast: loopback(port_b),
            ..base.clone()
        },
        Config {
            port: port_b,
            broadcast: loopback(port_a),
            ..base
        },
    )
}

async fn wait_for_peer(node: &NodeHandle, name: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if node.peers().iter().any(|peer| peer.name == name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{name} was never discovered"));
}

async fn next_event(events: &mut UnboundedReceiver<NodeEvent>) -> NodeEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a node event")
        .expect("event channel closed")
}

#[tokio::test]
async fn nodes_discover_each_other() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, cfg_b) = config_pair(47301, 47302, downloads.path());

    let (alpha, _alpha_events) = node::spawn("alpha", cfg_a).await.unwrap();
    let (beta, _beta_events) = node::spawn("beta", cfg_b).await.unwrap();

    wait_for_peer(&alpha, "beta").await;
    wait_for_peer(&beta, "alpha").await;

    let beta_entry = &alpha.peers()[0];
    assert_eq!(beta_entry.name, "beta");
    assert!(beta_entry.addr.ip().is_loopback());
    assert_eq!(beta_entry.addr.port(), 47302);

    alpha.shutdown();
    beta.shutdown();
}

#[tokio::test]
async fn talk_is_delivered_and_acknowledged() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, cfg_b) = config_pair(47311, 47312, downloads.path());

    let (alpha, _alpha_events) = node::spawn("alpha", cfg_a).await.unwrap();
    let (beta, mut beta_events) = node::spawn("beta", cfg_b).await.unwrap();

    wait_for_peer(&alpha, "beta").await;
    wait_for_peer(&beta, "alpha").await;

    let delivery = alpha.talk("beta", "hello over there").await.unwrap();
    assert_eq!(delivery, Delivery::Delivered);

    let event = next_event(&mut beta_events).await;
    assert_eq!(
        event,
        NodeEvent::Message {
            from: "alpha".to_string(),
            body: "hello over there".to_string(),
        }
    );

    alpha.shutdown();
    beta.shutdown();
}

#[tokio::test]
async fn talk_to_unknown_peer_fails_without_sending() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, _) = config_pair(47321, 47322, downloads.path());
    let (alpha, _events) = node::spawn("alpha", cfg_a).await.unwrap();

    let err = alpha.talk("ghost", "anyone home?").await.unwrap_err();
    assert!(err.to_string().contains("ghost"));

    alpha.shutdown();
}

#[tokio::test]
async fn duplicate_talk_is_reacked_but_displayed_once() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, _) = config_pair(47331, 47332, downloads.path());
    let (alpha, mut alpha_events) = node::spawn("alpha", cfg_a).await.unwrap();

    let probe = UdpSocket::bind(loopback(0)).await.unwrap();
    let target = loopback(47331);
    let mut buffer = [0u8; 256];

    for _ in 0..2 {
        probe.send_to(b"TALK probe-1-1234 hi", target).await.unwrap();
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), probe.recv_from(&mut buffer))
            .await
            .expect("no ack for TALK")
            .unwrap();
        assert_eq!(&buffer[..len], b"ACK probe-1-1234");
    }

    // Displayed exactly once despite two deliveries.
    let event = next_event(&mut alpha_events).await;
    assert!(matches!(event, NodeEvent::Message { body, .. } if body == "hi"));
    assert!(alpha_events.try_recv().is_err());

    alpha.shutdown();
}

#[tokio::test]
async fn file_transfer_end_to_end() {
    let downloads = tempfile::tempdir().unwrap();
    let outbox = tempfile::tempdir().unwrap();
    let (cfg_a, cfg_b) = config_pair(47341, 47342, downloads.path());

    let (alpha, _alpha_events) = node::spawn("alpha", cfg_a).await.unwrap();
    let (beta, mut beta_events) = node::spawn("beta", cfg_b).await.unwrap();

    wait_for_peer(&alpha, "beta").await;
    wait_for_peer(&beta, "alpha").await;

    // 900 bytes: three full chunks plus a partial fourth.
    let payload: Vec<u8> = (0..900u32).map(|n| (n % 251) as u8).collect();
    let source = outbox.path().join("payload.bin");
    std::fs::write(&source, &payload).unwrap();

    let outcome = alpha.send_file("beta", &source, |_, _| {}).await.unwrap();
    assert_eq!(outcome, TransferOutcome::Completed { chunks: 4 });

    let started = next_event(&mut beta_events).await;
    assert_eq!(
        started,
        NodeEvent::TransferStarted {
            from: "alpha".to_string(),
            file_name: "payload.bin".to_string(),
            size: 900,
        }
    );

    let finished = next_event(&mut beta_events).await;
    let path = match finished {
        NodeEvent::TransferFinished { path, .. } => path,
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(path, downloads.path().join("payload.bin"));
    assert_eq!(std::fs::read(&path).unwrap(), payload);

    alpha.shutdown();
    beta.shutdown();
}

#[tokio::test]
async fn transfer_of_missing_file_fails_locally() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, cfg_b) = config_pair(47351, 47352, downloads.path());

    let (alpha, _alpha_events) = node::spawn("alpha", cfg_a).await.unwrap();
    let (beta, _beta_events) = node::spawn("beta", cfg_b).await.unwrap();
    wait_for_peer(&alpha, "beta").await;

    let err = alpha
        .send_file("beta", Path::new("/nonexistent/nothing.bin"), |_, _| {})
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nothing.bin"));

    alpha.shutdown();
    beta.shutdown();
}

#[tokio::test]
async fn silent_peer_exhausts_retries() {
    let downloads = tempfile::tempdir().unwrap();
    let (cfg_a, _) = config_pair(47361, 47362, downloads.path());
    let (alpha, _events) = node::spawn("alpha", cfg_a).await.unwrap();

    // A "peer" that heartbeats once and then never answers anything.
    let mute = UdpSocket::bind(loopback(0)).await.unwrap();
    mute.send_to(b"HEARTBEAT mute", loopback(47361))
        .await
        .unwrap();
    wait_for_peer(&alpha, "mute").await;

    let delivery = alpha.talk("mute", "hello?").await.unwrap();
    assert_eq!(delivery, Delivery::Exhausted);

    alpha.shutdown();
}
