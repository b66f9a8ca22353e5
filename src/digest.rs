//! Operator-supplied expected digest.

use std::fmt;

/// Length of a SHA-256 digest rendered as hex.
pub const SHA256_HEX_LEN: usize = 64;

/// Expected digest exactly as configured.
///
/// The value is kept verbatim so that a mistyped or truncated configuration
/// fails closed instead of being normalized into a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest(String);

impl ExpectedDigest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for exactly 64 lowercase hex characters.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == SHA256_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Exact, case-sensitive comparison against a computed hex digest.
    pub fn matches(&self, computed: &str) -> bool {
        self.0 == computed
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
