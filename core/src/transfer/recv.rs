use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use lanlink_protocols::{Frame, hash, ident};
use tracing::{debug, warn};

use crate::events::NodeEvent;

/// NACK reason when the assembled file's hash differs from the END frame's.
pub const REASON_HASH_MISMATCH: &str = "hash_mismatch";
/// NACK reason when the file could not be written or read back.
pub const REASON_WRITE_FAILED: &str = "write_failed";

struct Session {
    file_name: String,
    chunks: BTreeMap<u32, Vec<u8>>,
    origin: String,
}

/// Reassembly state for every transfer currently being received.
///
/// Owned by the dispatch loop; the blocking assembly work is handed out as a
/// [`FinishJob`] so the loop never stalls on disk I/O.
pub struct InboundTransfers {
    sessions: HashMap<String, Session>,
    download_dir: PathBuf,
}

impl InboundTransfers {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            sessions: HashMap::new(),
            download_dir,
        }
    }

    /// Handles a FILE offer. A duplicate offer for a live session re-acks
    /// without resetting anything: the first ACK may simply have been lost.
    pub fn offer(
        &mut self,
        id: &str,
        name: &str,
        size: u64,
        origin: String,
    ) -> (Frame, Option<NodeEvent>) {
        let ack = Frame::Ack { id: id.to_string() };

        if self.sessions.contains_key(id) {
            debug!("duplicate FILE offer for {id}, re-acking");
            return (ack, None);
        }

        let file_name = sanitize_name(name);
        debug!("accepting transfer {id}: {file_name} ({size} bytes) from {origin}");

        let event = NodeEvent::TransferStarted {
            from: origin.clone(),
            file_name: file_name.clone(),
            size,
        };
        self.sessions.insert(
            id.to_string(),
            Session {
                file_name,
                chunks: BTreeMap::new(),
                origin,
            },
        );
        (ack, Some(event))
    }

    /// Handles a CHUNK. Unknown transfer ids are ignored; the sender's FILE
    /// or END retries recover the situation. Duplicate sequences re-ack
    /// without storing.
    pub fn store(&mut self, id: &str, seq: u32, data: Vec<u8>) -> Option<Frame> {
        let session = match self.sessions.get_mut(id) {
            Some(session) => session,
            None => {
                debug!("chunk for unknown transfer {id}");
                return None;
            }
        };

        if session.chunks.contains_key(&seq) {
            debug!("duplicate chunk {seq} for {id}, re-acking");
        } else {
            session.chunks.insert(seq, data);
        }

        Some(Frame::Ack {
            id: ident::chunk_ack_id(id, seq),
        })
    }

    /// Handles an END by closing the session and packaging the blocking
    /// assembly work. `None` when the id is unknown.
    pub fn finish(&mut self, id: &str, expected_hash: String) -> Option<FinishJob> {
        let session = self.sessions.remove(id)?;
        let destination = self.download_dir.join(&session.file_name);
        Some(FinishJob {
            id: id.to_string(),
            expected_hash,
            destination,
            session,
        })
    }

    pub fn active(&self) -> usize {
        self.sessions.len()
    }
}

/// Everything needed to write out and verify one finished transfer.
pub struct FinishJob {
    id: String,
    expected_hash: String,
    destination: PathBuf,
    session: Session,
}

impl FinishJob {
    /// Writes the chunks in sequence order, verifies the hash, and returns
    /// the reply frame plus the front-end event. Blocking; run it under
    /// `spawn_blocking`.
    pub fn run(self) -> (Frame, NodeEvent) {
        let id = self.id.clone();
        let from = self.session.origin.clone();
        let file_name = self.session.file_name.clone();

        match self.assemble() {
            Ok(path) => (
                Frame::Ack { id },
                NodeEvent::TransferFinished {
                    from,
                    file_name,
                    path,
                },
            ),
            Err(reason) => (
                Frame::Nack {
                    id,
                    reason: reason.clone(),
                },
                NodeEvent::TransferFailed {
                    from,
                    file_name,
                    reason,
                },
            ),
        }
    }

    fn assemble(&self) -> Result<PathBuf, String> {
        if let Err(e) = self.write_chunks() {
            warn!("failed to write {}: {e}", self.destination.display());
            let _ = std::fs::remove_file(&self.destination);
            return Err(REASON_WRITE_FAILED.to_string());
        }

        match hash::file_sha256(&self.destination) {
            Ok(actual) if actual == self.expected_hash => Ok(self.destination.clone()),
            Ok(actual) => {
                warn!(
                    "hash mismatch for {}: expected {}, computed {actual}",
                    self.destination.display(),
                    self.expected_hash
                );
                let _ = std::fs::remove_file(&self.destination);
                Err(REASON_HASH_MISMATCH.to_string())
            }
            Err(e) => {
                warn!("failed to hash {}: {e}", self.destination.display());
                let _ = std::fs::remove_file(&self.destination);
                Err(REASON_WRITE_FAILED.to_string())
            }
        }
    }

    fn write_chunks(&self) -> std::io::Result<()> {
        let mut file = std::fs::File::create(&self.destination)?;
        for data in self.session.chunks.values() {
            file.write_all(data)?;
        }
        file.flush()
    }
}

/// Strips any path components a peer may have smuggled into the file name.
fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|base| base.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_protocols::frame::CHUNK_SIZE;

    fn transfers(dir: &Path) -> InboundTransfers {
        InboundTransfers::new(dir.to_path_buf())
    }

    #[test]
    fn offer_opens_one_session_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());

        let (reply, event) = inbound.offer("t-1", "notes.txt", 11, "alpha".into());
        assert_eq!(reply, Frame::Ack { id: "t-1".into() });
        assert!(matches!(event, Some(NodeEvent::TransferStarted { .. })));
        assert_eq!(inbound.active(), 1);

        let (reply, event) = inbound.offer("t-1", "notes.txt", 11, "alpha".into());
        assert_eq!(reply, Frame::Ack { id: "t-1".into() });
        assert!(event.is_none(), "duplicate offer must not restart a session");
        assert_eq!(inbound.active(), 1);
    }

    #[test]
    fn chunk_for_unknown_transfer_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        assert!(inbound.store("nope", 0, vec![1, 2, 3]).is_none());
    }

    #[test]
    fn duplicate_chunk_is_reacked_but_not_stored_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        inbound.offer("t-1", "notes.txt", 3, "alpha".into());

        let first = inbound.store("t-1", 0, b"abc".to_vec()).unwrap();
        let second = inbound.store("t-1", 0, b"XYZ".to_vec()).unwrap();
        assert_eq!(first, second);

        let job = inbound.finish("t-1", sha256_hex(b"abc")).unwrap();
        let (reply, _) = job.run();
        assert_eq!(reply, Frame::Ack { id: "t-1".into() });
    }

    #[test]
    fn finish_assembles_chunks_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        inbound.offer("t-1", "out.bin", 6, "alpha".into());

        // Deliver out of order.
        inbound.store("t-1", 1, b"def".to_vec());
        inbound.store("t-1", 0, b"abc".to_vec());

        let job = inbound.finish("t-1", sha256_hex(b"abcdef")).unwrap();
        let (reply, event) = job.run();

        assert_eq!(reply, Frame::Ack { id: "t-1".into() });
        let path = match event {
            NodeEvent::TransferFinished { path, .. } => path,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(std::fs::read(path).unwrap(), b"abcdef");
        assert_eq!(inbound.active(), 0);
    }

    #[test]
    fn hash_mismatch_deletes_the_file_and_nacks() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        inbound.offer("t-1", "out.bin", 3, "alpha".into());
        inbound.store("t-1", 0, b"abc".to_vec());

        let job = inbound.finish("t-1", "0".repeat(64)).unwrap();
        let (reply, event) = job.run();

        assert_eq!(
            reply,
            Frame::Nack {
                id: "t-1".into(),
                reason: REASON_HASH_MISMATCH.into(),
            }
        );
        assert!(matches!(event, NodeEvent::TransferFailed { .. }));
        assert!(!dir.path().join("out.bin").exists());
    }

    #[test]
    fn end_for_unknown_transfer_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        assert!(inbound.finish("nope", "00".into()).is_none());
    }

    #[test]
    fn file_names_are_stripped_of_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        inbound.offer("t-1", "../../etc/passwd", 3, "mallory".into());
        inbound.store("t-1", 0, b"abc".to_vec());

        let job = inbound.finish("t-1", sha256_hex(b"abc")).unwrap();
        let (_, event) = job.run();

        let path = match event {
            NodeEvent::TransferFinished { path, .. } => path,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(path, dir.path().join("passwd"));
    }

    #[test]
    fn empty_transfer_produces_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut inbound = transfers(dir.path());
        inbound.offer("t-1", "empty.bin", 0, "alpha".into());

        let job = inbound.finish("t-1", sha256_hex(b"")).unwrap();
        let (reply, _) = job.run();

        assert_eq!(reply, Frame::Ack { id: "t-1".into() });
        assert_eq!(
            std::fs::read(dir.path().join("empty.bin")).unwrap(),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn chunk_size_fits_in_one_datagram_after_encoding() {
        // 250 raw bytes expand to 336 base64 characters, well inside the
        // receive buffer with the frame header included.
        assert!(CHUNK_SIZE.div_ceil(3) * 4 < lanlink_protocols::frame::MAX_DATAGRAM);
    }

    fn sha256_hex(data: &[u8]) -> String {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe");
        std::fs::File::create(&path).unwrap().write_all(data).unwrap();
        hash::file_sha256(&path).unwrap()
    }
}
