//! Message and transfer identifiers.
//!
//! Ids are generated by the sending side and treated as opaque strings by
//! everyone else. The embedded node name and timestamp keep them unique across
//! the network without coordination.

use std::time::{SystemTime, UNIX_EPOCH};

/// Creates a fresh id of the form `<node>-<unix-secs>-<4-digit random>`.
pub fn message_id(node: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let salt: u32 = rand::random_range(1000..10000);
    format!("{node}-{secs}-{salt}")
}

/// Ack id acknowledging one chunk of a transfer.
pub fn chunk_ack_id(transfer_id: &str, seq: u32) -> String {
    format!("{transfer_id}-{seq}")
}
