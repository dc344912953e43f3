use std::path::Path;

use sha2::{Digest, Sha256};
use stashtag_core::Fingerprint;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read size per hashing step. Inputs include multi-gigabyte videos.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(&Sha256::digest(bytes))
}

/// Stream a file through SHA-256 without holding more than one chunk in memory.
pub async fn fingerprint_file(path: impl AsRef<Path>) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Fingerprint::from_digest(&hasher.finalize()))
}
