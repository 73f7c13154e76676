//! # Reliable Delivery
//!
//! UDP gives no confirmation, so every frame that matters carries an id and
//! the peer answers `ACK <id>` or `NACK <id> <reason>`. The [`AckRegistry`]
//! matches those answers to the task waiting on them; [`send_acknowledged`]
//! wraps the full send / wait / retry cycle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use anyhow::Context;
use lanlink_common::config::Config;
use lanlink_protocols::Frame;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::debug;

/// What a peer answered for one acknowledged id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Ack,
    Nack(String),
}

/// Final result of an acknowledged send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The peer confirmed receipt.
    Delivered,
    /// The peer refused, with its reason.
    Rejected(String),
    /// Every attempt went unanswered.
    Exhausted,
}

/// Routes inbound ACK/NACK frames to the single task waiting on each id.
#[derive(Default)]
pub struct AckRegistry {
    waiters: Mutex<HashMap<String, oneshot::Sender<AckOutcome>>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`, replacing any stale one left behind by a
    /// timed-out attempt.
    pub fn register(&self, id: &str) -> oneshot::Receiver<AckOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(id.to_string(), tx);
        rx
    }

    /// Completes the waiter for `id`. Returns false when nobody was waiting,
    /// which the dispatch loop logs and otherwise ignores.
    pub fn complete(&self, id: &str, outcome: AckOutcome) -> bool {
        match self.waiters.lock().unwrap().remove(id) {
            Some(waiter) => waiter.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Discards the waiter for `id` after its attempt gave up.
    pub fn forget(&self, id: &str) {
        self.waiters.lock().unwrap().remove(id);
    }
}

/// Sends `frame` once and waits up to `cfg.ack_timeout` for the answer.
///
/// `None` means the attempt went unanswered. The waiter is registered before
/// the datagram leaves so an instant reply cannot be missed.
pub async fn attempt(
    socket: &UdpSocket,
    target: SocketAddr,
    frame: &Frame,
    ack_id: &str,
    acks: &AckRegistry,
    cfg: &Config,
) -> anyhow::Result<Option<AckOutcome>> {
    let waiter = acks.register(ack_id);
    if let Err(e) = socket.send_to(frame.encode().as_bytes(), target).await {
        acks.forget(ack_id);
        return Err(e).with_context(|| format!("sending to {target}"));
    }

    match tokio::time::timeout(cfg.ack_timeout, waiter).await {
        Ok(Ok(outcome)) => Ok(Some(outcome)),
        // Waiter replaced by a newer registration for the same id.
        Ok(Err(_)) => Ok(None),
        Err(_) => {
            acks.forget(ack_id);
            Ok(None)
        }
    }
}

/// Full retry cycle: attempt, pause, attempt again, up to `cfg.max_attempts`.
pub async fn send_acknowledged(
    socket: &UdpSocket,
    target: SocketAddr,
    frame: &Frame,
    ack_id: &str,
    acks: &AckRegistry,
    cfg: &Config,
) -> anyhow::Result<Delivery> {
    for attempt_no in 1..=cfg.max_attempts {
        debug!("sending {ack_id} to {target} (attempt {attempt_no}/{})", cfg.max_attempts);

        match attempt(socket, target, frame, ack_id, acks, cfg).await? {
            Some(AckOutcome::Ack) => return Ok(Delivery::Delivered),
            Some(AckOutcome::Nack(reason)) => return Ok(Delivery::Rejected(reason)),
            None => {}
        }

        if attempt_no < cfg.max_attempts {
            tokio::time::sleep(cfg.retry_pause).await;
        }
    }

    Ok(Delivery::Exhausted)
}
