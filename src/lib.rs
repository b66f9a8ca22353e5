//! Verify a model file's SHA-256 digest before handing it to a loader.

pub mod config;
pub mod digest;
pub mod gate;
pub mod hashing;
pub mod loader;
pub mod logging;
pub mod report;
pub mod verify;
