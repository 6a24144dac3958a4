//! Content fingerprinting for the resumability ledger.
//!
//! The fingerprint is a blake3 hash of the raw input, rendered as a hex
//! string so it round-trips losslessly through the ledger table.

use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::types::Segment;

/// Fingerprint an in-memory byte buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fingerprint a file's raw bytes, streaming in 1 MiB reads so large
/// transcripts do not need to fit in memory.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 1024 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint a canonicalized segment list. Used when the caller holds
/// segments rather than the raw file bytes.
pub fn fingerprint_segments(segments: &[Segment]) -> Result<String> {
    let canonical = serde_json::to_vec(segments)?;
    Ok(fingerprint_bytes(&canonical))
}
