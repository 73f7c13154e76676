//! File integrity hashing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 4096;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
///
/// Blocking; callers on an async runtime should wrap this in
/// `spawn_blocking`.
pub fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("opening {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; BLOCK_SIZE];

    loop {
        let read = file
            .read(&mut block)
            .with_context(|| format!("reading {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
