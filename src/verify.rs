//! Integrity check: compare a fresh digest with the expected one.

use std::path::Path;

use crate::digest::ExpectedDigest;
use crate::hashing::{sha256_file, DigestError};

/// Result of checking one file against its expected digest.
#[derive(Debug)]
pub enum Integrity {
    Verified {
        digest: String,
    },
    Mismatch {
        computed: String,
        expected: ExpectedDigest,
    },
    Unreadable(DigestError),
}

impl Integrity {
    pub fn is_verified(&self) -> bool {
        matches!(self, Integrity::Verified { .. })
    }
}

/// Hash `path` and compare against `expected`.
///
/// I/O failures are returned as [`Integrity::Unreadable`], never as a digest.
pub fn check(path: &Path, expected: &ExpectedDigest, chunk_size: usize) -> Integrity {
    if !expected.is_well_formed() {
        tracing::warn!(
            expected = %expected,
            "expected digest is not 64 lowercase hex characters; it cannot match"
        );
    }
    let computed = match sha256_file(path, chunk_size) {
        Ok(digest) => digest,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot hash model file");
            return Integrity::Unreadable(err);
        }
    };
    if expected.matches(&computed) {
        tracing::debug!(path = %path.display(), digest = %computed, "integrity verified");
        Integrity::Verified { digest: computed }
    } else {
        tracing::debug!(
            path = %path.display(),
            %computed,
            expected = %expected,
            "digest mismatch"
        );
        Integrity::Mismatch {
            computed,
            expected: expected.clone(),
        }
    }
}

/// Boolean form of [`check`]; unreadable files fail closed.
pub fn verify(path: &Path, expected: &ExpectedDigest, chunk_size: usize) -> bool {
    check(path, expected, chunk_size).is_verified()
}
