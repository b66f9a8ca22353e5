//! Console and machine-readable reporting of a gate run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::config::GateConfig;
use crate::gate::GateOutcome;

/// Tool version emitted in JSON reports.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON document printed with `--json`.
#[derive(Serialize)]
pub struct Report {
    pub tool_version: String,
    pub model_path: String,
    pub expected_sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_sha256: Option<String>,
    pub outcome: Outcome,
    /// Set when a rejected model file was deleted.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub model_removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Error details attached to a non-ready outcome.
#[derive(Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ready,
    Rejected,
    Unreadable,
    LoadFailed,
}

impl Report {
    pub fn new(config: &GateConfig, outcome: &GateOutcome) -> Self {
        let (kind, error) = match outcome {
            GateOutcome::Ready { .. } => (Outcome::Ready, None),
            GateOutcome::Rejected { .. } => (
                Outcome::Rejected,
                Some(ErrorReport {
                    code: "hash_mismatch".to_string(),
                    message: "integrity check failed! possible tampering detected".to_string(),
                    details: Vec::new(),
                }),
            ),
            GateOutcome::Unreadable(err) => (
                Outcome::Unreadable,
                Some(error_report(err.code(), err)),
            ),
            GateOutcome::LoadFailed { error, .. } => {
                (Outcome::LoadFailed, Some(error_report("model_load", error)))
            }
        };
        Report {
            tool_version: TOOL_VERSION.to_string(),
            model_path: config.model_path.display().to_string(),
            expected_sha256: config.expected_digest_hex.clone(),
            computed_sha256: outcome.computed_digest().map(str::to_string),
            outcome: kind,
            model_removed: matches!(outcome, GateOutcome::Rejected { removed: true, .. }),
            error,
        }
    }
}

fn causes(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut details = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        details.push(cause.to_string());
        source = cause.source();
    }
    details
}

fn error_report(code: &str, err: &(dyn std::error::Error + 'static)) -> ErrorReport {
    ErrorReport {
        code: code.to_string(),
        message: err.to_string(),
        details: causes(err),
    }
}

/// `err` followed by its sources, joined like anyhow's `{:#}`.
pub fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    for cause in causes(err) {
        text.push_str(": ");
        text.push_str(&cause);
    }
    text
}

/// Serialize `report` as pretty JSON followed by a newline.
pub fn write_json(mut out: impl Write, report: &Report) -> Result<()> {
    let json = serde_json::to_vec_pretty(report).context("serialize report")?;
    out.write_all(&json).context("write report")?;
    out.write_all(b"\n").context("write report")?;
    Ok(())
}

/// Print status lines: successes to `out`, failures to `err`.
pub fn write_human(
    mut out: impl Write,
    mut err: impl Write,
    config: &GateConfig,
    outcome: &GateOutcome,
) -> Result<()> {
    let path = config.model_path.display();
    match outcome {
        GateOutcome::Ready { digest, session } => {
            writeln!(out, "integrity verified: {path} (sha256 {digest})")?;
            writeln!(
                out,
                "model loaded: {} ({} bytes), ready for inference",
                session.path.display(),
                session.size_bytes
            )?;
        }
        GateOutcome::Rejected {
            computed,
            expected,
            removed,
        } => {
            writeln!(
                err,
                "integrity check failed! possible tampering detected: {path}"
            )?;
            writeln!(err, "  expected sha256: {expected}")?;
            writeln!(err, "  computed sha256: {computed}")?;
            if *removed {
                writeln!(err, "  removed rejected model: {path}")?;
            } else if config.remove_on_mismatch {
                writeln!(err, "  failed to remove rejected model: {path}")?;
            }
        }
        GateOutcome::Unreadable(e) if e.is_missing() => {
            writeln!(err, "error: model file not found: {path}")?;
        }
        GateOutcome::Unreadable(e) => {
            writeln!(err, "error: {}", describe(e))?;
        }
        GateOutcome::LoadFailed { digest, error } => {
            writeln!(out, "integrity verified: {path} (sha256 {digest})")?;
            writeln!(err, "failed to load model: {}", describe(error))?;
        }
    }
    Ok(())
}
