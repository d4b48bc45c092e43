//! Configuration for the fingerprint stage.

use serde::{Deserialize, Serialize};

/// Runtime configuration for [`crate::simhash`].
///
/// The shingle length and seed are part of the fingerprint contract: two
/// fingerprints are only comparable when they were produced with the same
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Shingle length in tokens.
    pub shingle_len: usize,
    /// Seed mixed into the per-shingle hash.
    pub seed: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            shingle_len: 2,
            seed: 0x9E37_79B9,
        }
    }
}

impl FingerprintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shingle_len(mut self, shingle_len: usize) -> Self {
        self.shingle_len = shingle_len.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }
}
