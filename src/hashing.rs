//! Streaming SHA-256 over files of arbitrary size.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Read size used when the caller has no preference.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Failure to produce a digest for a file.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("cannot open {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed reading {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DigestError {
    /// True when the file does not exist at all.
    pub fn is_missing(&self) -> bool {
        matches!(self, DigestError::Open { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Stable identifier used in machine-readable reports.
    pub fn code(&self) -> &'static str {
        match self {
            DigestError::Open { .. } => "file_open",
            DigestError::Read { .. } => "file_read",
        }
    }
}

/// Hash raw bytes and return a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fold a reader into a SHA-256 state `chunk_size` bytes at a time.
///
/// A zero chunk size is treated as 1.
pub fn sha256_reader(mut reader: impl Read, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file by streaming it in fixed-size chunks.
///
/// The handle is dropped on every return path; nothing is written.
pub fn sha256_file(path: &Path, chunk_size: usize) -> Result<String, DigestError> {
    let file = fs::File::open(path).map_err(|source| DigestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = sha256_reader(file, chunk_size).map_err(|source| DigestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), chunk_size, %digest, "computed file digest");
    Ok(digest)
}
