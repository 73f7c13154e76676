use std::path::PathBuf;

/// Everything the node surfaces to its front end. Core never prints; the CLI
/// decides how each of these looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// An acknowledged text message arrived.
    Message { from: String, body: String },
    /// A peer offered a file and the offer was accepted.
    TransferStarted {
        from: String,
        file_name: String,
        size: u64,
    },
    /// An inbound transfer finished and its hash checked out.
    TransferFinished {
        from: String,
        file_name: String,
        path: PathBuf,
    },
    /// An inbound transfer failed; `reason` matches the NACK sent back.
    TransferFailed {
        from: String,
        file_name: String,
        reason: String,
    },
    /// A peer stopped heartbeating and was dropped from the table.
    PeerLost { name: String },
}
