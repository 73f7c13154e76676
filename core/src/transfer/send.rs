use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use lanlink_common::config::Config;
use lanlink_protocols::frame::CHUNK_SIZE;
use lanlink_protocols::{Frame, hash, ident};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::delivery::{self, AckOutcome, AckRegistry, Delivery};

/// How an outbound transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The receiver verified the hash and acknowledged completion.
    Completed { chunks: u32 },
    /// The receiver refused the offer or failed verification.
    Rejected { reason: String },
    /// Some phase ran out of attempts without any reply.
    Exhausted,
}

/// Pushes one file to `peer_addr`.
///
/// `progress` observes `(chunks delivered, chunks total)` after each
/// acknowledged chunk. Local problems (missing file, unreadable name) fail
/// before any datagram is sent.
pub async fn send_file(
    socket: &UdpSocket,
    acks: &AckRegistry,
    cfg: &Config,
    node_name: &str,
    peer_addr: SocketAddr,
    path: &Path,
    progress: impl Fn(u32, u32),
) -> anyhow::Result<TransferOutcome> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(metadata.is_file(), "{} is not a regular file", path.display());

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    // The wire format cannot carry spaces inside a file name.
    anyhow::ensure!(
        !file_name.contains(' '),
        "file name `{file_name}` contains spaces"
    );

    let size = metadata.len();
    let total_chunks = size.div_ceil(CHUNK_SIZE as u64) as u32;
    let id = ident::message_id(node_name);

    let offer = Frame::File {
        id: id.clone(),
        name: file_name.to_string(),
        size,
    };
    match delivery::send_acknowledged(socket, peer_addr, &offer, &id, acks, cfg).await? {
        Delivery::Delivered => {}
        Delivery::Rejected(reason) => return Ok(TransferOutcome::Rejected { reason }),
        Delivery::Exhausted => return Ok(TransferOutcome::Exhausted),
    }
    info!("transfer {id} accepted, sending {file_name} in {total_chunks} chunks");

    let mut file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];

    for seq in 0..total_chunks {
        let read = read_full_chunk(&mut file, &mut buffer).await?;
        if read == 0 {
            // File shrank underneath us; END will fail the hash check.
            break;
        }

        let chunk = Frame::Chunk {
            id: id.clone(),
            seq,
            data: buffer[..read].to_vec(),
        };
        let ack_id = ident::chunk_ack_id(&id, seq);
        if !push_chunk(socket, peer_addr, &chunk, &ack_id, acks, cfg).await? {
            return Ok(TransferOutcome::Exhausted);
        }
        progress(seq + 1, total_chunks);
    }

    let hash = {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash::file_sha256(&path)).await??
    };
    let end = Frame::End {
        id: id.clone(),
        hash,
    };
    match delivery::send_acknowledged(socket, peer_addr, &end, &id, acks, cfg).await? {
        Delivery::Delivered => Ok(TransferOutcome::Completed {
            chunks: total_chunks,
        }),
        Delivery::Rejected(reason) => Ok(TransferOutcome::Rejected { reason }),
        Delivery::Exhausted => Ok(TransferOutcome::Exhausted),
    }
}

/// One chunk's retry loop. Unlike [`delivery::send_acknowledged`], a NACK
/// only costs an attempt: the receiver may recover on a resend.
async fn push_chunk(
    socket: &UdpSocket,
    target: SocketAddr,
    chunk: &Frame,
    ack_id: &str,
    acks: &AckRegistry,
    cfg: &Config,
) -> anyhow::Result<bool> {
    for attempt_no in 1..=cfg.max_attempts {
        match delivery::attempt(socket, target, chunk, ack_id, acks, cfg).await? {
            Some(AckOutcome::Ack) => return Ok(true),
            Some(AckOutcome::Nack(reason)) => debug!("chunk {ack_id} refused: {reason}"),
            None => debug!("chunk {ack_id} unanswered (attempt {attempt_no})"),
        }
        if attempt_no < cfg.max_attempts {
            tokio::time::sleep(cfg.retry_pause).await;
        }
    }
    Ok(false)
}

/// Reads until the buffer is full or the file ends; short reads mid-file
/// must not shrink a chunk.
async fn read_full_chunk(file: &mut File, buffer: &mut [u8]) -> anyhow::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
