//! Verify-then-load driver.
//!
//! ```text
//! Verifying -> Verified -> Loading -> Ready | LoadFailed
//!           -> Unverified -> Rejected
//!           -> Unreadable
//! ```

use std::fs;

use crate::config::GateConfig;
use crate::digest::ExpectedDigest;
use crate::hashing::DigestError;
use crate::loader::{LoadError, ModelLoader, ModelSession};
use crate::verify::{check, Integrity};

/// Exit code for a verified and loaded model.
pub const EXIT_READY: u8 = 0;
/// Exit code when the digest did not match.
pub const EXIT_REJECTED: u8 = 1;
/// Exit code when the model (or configuration) could not be read.
pub const EXIT_UNREADABLE: u8 = 2;
/// Exit code when the loader refused a verified model.
pub const EXIT_LOAD_FAILED: u8 = 3;

/// Terminal state of one check-and-maybe-load cycle.
#[derive(Debug)]
pub enum GateOutcome {
    Ready {
        digest: String,
        session: ModelSession,
    },
    LoadFailed {
        digest: String,
        error: LoadError,
    },
    Rejected {
        computed: String,
        expected: ExpectedDigest,
        /// The model file was deleted after the mismatch.
        removed: bool,
    },
    Unreadable(DigestError),
}

impl GateOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            GateOutcome::Ready { .. } => EXIT_READY,
            GateOutcome::Rejected { .. } => EXIT_REJECTED,
            GateOutcome::Unreadable(_) => EXIT_UNREADABLE,
            GateOutcome::LoadFailed { .. } => EXIT_LOAD_FAILED,
        }
    }

    /// Digest computed during this cycle, if the file could be read.
    pub fn computed_digest(&self) -> Option<&str> {
        match self {
            GateOutcome::Ready { digest, .. } | GateOutcome::LoadFailed { digest, .. } => {
                Some(digest.as_str())
            }
            GateOutcome::Rejected { computed, .. } => Some(computed.as_str()),
            GateOutcome::Unreadable(_) => None,
        }
    }
}

/// Check the configured model and hand it to `loader` only if it matches.
///
/// The loader runs at most once; a load failure does not trigger another
/// integrity check.
pub fn run_gate(config: &GateConfig, loader: &mut dyn ModelLoader) -> GateOutcome {
    let expected = ExpectedDigest::new(config.expected_digest_hex.clone());
    tracing::debug!(
        path = %config.model_path.display(),
        chunk_size = config.chunk_size_bytes,
        "verifying model"
    );
    let digest = match check(&config.model_path, &expected, config.chunk_size_bytes) {
        Integrity::Verified { digest } => digest,
        Integrity::Mismatch { computed, expected } => {
            let removed = config.remove_on_mismatch && quarantine(config);
            return GateOutcome::Rejected {
                computed,
                expected,
                removed,
            };
        }
        Integrity::Unreadable(err) => return GateOutcome::Unreadable(err),
    };

    tracing::debug!(path = %config.model_path.display(), "loading verified model");
    match loader.load(&config.model_path) {
        Ok(session) => {
            tracing::debug!(
                path = %session.path.display(),
                size_bytes = session.size_bytes,
                "model loaded"
            );
            GateOutcome::Ready { digest, session }
        }
        Err(error) => {
            tracing::debug!(path = %config.model_path.display(), %error, "model load failed");
            GateOutcome::LoadFailed { digest, error }
        }
    }
}

/// Delete a rejected model. Returns whether the file is gone.
fn quarantine(config: &GateConfig) -> bool {
    match fs::remove_file(&config.model_path) {
        Ok(()) => {
            tracing::debug!(path = %config.model_path.display(), "removed rejected model");
            true
        }
        Err(err) => {
            tracing::warn!(
                path = %config.model_path.display(),
                error = %err,
                "failed to remove rejected model"
            );
            false
        }
    }
}
