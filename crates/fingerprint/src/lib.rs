//! Locality-sensitive fingerprinting for Anchor.
//!
//! This crate produces a 64-bit simhash over shingled tokens. Identical text
//! always produces an identical fingerprint, and near-identical text lands
//! within a few bits of Hamming distance, which is what the drift detector
//! relies on. Both operations run in O(n) over the input tokens.

mod config;
mod simhash;

pub use config::FingerprintConfig;
pub use simhash::{distance, simhash};
