//! # File Transfer
//!
//! Files travel as a FILE offer, a run of base64 CHUNK frames, and an END
//! frame carrying the SHA-256 of the whole file. Every step is acknowledged
//! individually, so a transfer survives arbitrary datagram loss as long as
//! retries hold out.

mod recv;
mod send;

pub use recv::{FinishJob, InboundTransfers, REASON_HASH_MISMATCH, REASON_WRITE_FAILED};
pub use send::{TransferOutcome, send_file};
