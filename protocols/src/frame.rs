//! # Wire Format
//!
//! Defines the datagram vocabulary every node speaks.
//!
//! Frames are plain text, one frame per datagram, with a leading keyword and
//! space-separated fields. Fields that may contain spaces (a TALK body, a NACK
//! reason) are always the final field and absorb the rest of the datagram.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Upper bound for a single datagram, receive side.
pub const MAX_DATAGRAM: usize = 8192;

/// Raw bytes carried per CHUNK frame, before base64 expansion.
pub const CHUNK_SIZE: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Broadcast presence announcement.
    Heartbeat { name: String },
    /// Acknowledged text message.
    Talk { id: String, body: String },
    /// Offer to transfer a file of `size` bytes.
    File { id: String, name: String, size: u64 },
    /// One piece of a file transfer, 0-based sequence.
    Chunk { id: String, seq: u32, data: Vec<u8> },
    /// All chunks sent; `hash` is the SHA-256 of the whole file, lowercase hex.
    End { id: String, hash: String },
    /// Positive confirmation. For chunks the id is `<transfer>-<seq>`.
    Ack { id: String },
    /// Negative confirmation with a machine-readable reason.
    Nack { id: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown frame kind `{0}`")]
    UnknownKind(String),
    #[error("{kind} frame is missing the {field} field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("{kind} frame has a malformed {field}: `{value}`")]
    MalformedField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

impl Frame {
    /// Parses one datagram. Trailing whitespace is tolerated; anything that
    /// cannot be read as a complete frame yields a typed error.
    pub fn parse(input: &str) -> Result<Self, FrameError> {
        let input = input.trim_end();
        if input.is_empty() {
            return Err(FrameError::Empty);
        }

        let (kind, rest) = match input.split_once(' ') {
            Some((kind, rest)) => (kind, rest),
            None => (input, ""),
        };

        match kind {
            "HEARTBEAT" => {
                let name = final_field("HEARTBEAT", "name", rest)?;
                Ok(Frame::Heartbeat { name })
            }
            "TALK" => {
                let (id, rest) = field("TALK", "id", rest)?;
                let body = final_field("TALK", "body", &rest)?;
                Ok(Frame::Talk { id, body })
            }
            "FILE" => {
                let (id, rest) = field("FILE", "id", rest)?;
                let (name, rest) = field("FILE", "file-name", &rest)?;
                let size = final_field("FILE", "size", &rest)?;
                let size = parse_number("FILE", "size", &size)?;
                Ok(Frame::File { id, name, size })
            }
            "CHUNK" => {
                let (id, rest) = field("CHUNK", "id", rest)?;
                let (seq, rest) = field("CHUNK", "seq", &rest)?;
                let seq = parse_number("CHUNK", "seq", &seq)?;
                let encoded = final_field("CHUNK", "data", &rest)?;
                let data =
                    BASE64
                        .decode(&encoded)
                        .map_err(|_| FrameError::MalformedField {
                            kind: "CHUNK",
                            field: "data",
                            value: encoded,
                        })?;
                Ok(Frame::Chunk { id, seq, data })
            }
            "END" => {
                let (id, rest) = field("END", "id", rest)?;
                let hash = final_field("END", "hash", &rest)?;
                Ok(Frame::End { id, hash })
            }
            "ACK" => {
                let id = final_field("ACK", "id", rest)?;
                Ok(Frame::Ack { id })
            }
            "NACK" => {
                let (id, rest) = field("NACK", "id", rest)?;
                let reason = final_field("NACK", "reason", &rest)?;
                Ok(Frame::Nack { id, reason })
            }
            other => Err(FrameError::UnknownKind(other.to_string())),
        }
    }

    /// Renders the frame as one datagram. Inverse of [`Frame::parse`].
    pub fn encode(&self) -> String {
        match self {
            Frame::Heartbeat { name } => format!("HEARTBEAT {name}"),
            Frame::Talk { id, body } => format!("TALK {id} {body}"),
            Frame::File { id, name, size } => format!("FILE {id} {name} {size}"),
            Frame::Chunk { id, seq, data } => {
                format!("CHUNK {id} {seq} {}", BASE64.encode(data))
            }
            Frame::End { id, hash } => format!("END {id} {hash}"),
            Frame::Ack { id } => format!("ACK {id}"),
            Frame::Nack { id, reason } => format!("NACK {id} {reason}"),
        }
    }
}

/// Splits the next space-delimited token off `rest`.
fn field(
    kind: &'static str,
    field: &'static str,
    rest: &str,
) -> Result<(String, String), FrameError> {
    if rest.is_empty() {
        return Err(FrameError::MissingField { kind, field });
    }
    match rest.split_once(' ') {
        Some((token, tail)) => Ok((token.to_string(), tail.to_string())),
        None => Ok((rest.to_string(), String::new())),
    }
}

/// Consumes the rest of the datagram as the last field.
fn final_field(
    kind: &'static str,
    field: &'static str,
    rest: &str,
) -> Result<String, FrameError> {
    if rest.is_empty() {
        return Err(FrameError::MissingField { kind, field });
    }
    Ok(rest.to_string())
}

fn parse_number<T: std::str::FromStr>(
    kind: &'static str,
    field: &'static str,
    value: &str,
) -> Result<T, FrameError> {
    value.parse().map_err(|_| FrameError::MalformedField {
        kind,
        field,
        value: value.to_string(),
    })
}
