//! Content fingerprints

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;
use crate::shutdown::ShutdownSignal;

/// Bytes hashed between shutdown checks
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hash a stream in fixed-size chunks, stopping early on shutdown
pub async fn sha256_hex_reader<R>(mut reader: R, shutdown: &ShutdownSignal) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        shutdown.check()?;
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
