//! Configuration for the ingestion pipeline.

use atomize::AtomizeConfig;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`crate::IngestPipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Size gate: bodies larger than this take the streaming path.
    pub max_content_bytes: usize,
    /// Nominal streaming window size.
    pub chunk_bytes: usize,
    /// Overlap carried between consecutive windows.
    pub overlap_bytes: usize,
    /// How far past the nominal window end to look for a break point.
    pub lookahead_bytes: usize,
    /// Nearest-neighbor distance below which a molecule is a variant.
    pub drift_threshold: f32,
    /// Bucket applied when a request carries none.
    pub default_bucket: String,
    #[serde(skip)]
    pub atomize: AtomizeConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: 500 * 1024,
            chunk_bytes: 100 * 1024,
            overlap_bytes: 1024,
            lookahead_bytes: 5 * 1024,
            drift_threshold: 0.05,
            default_bucket: "default".to_string(),
            atomize: AtomizeConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_content_bytes(mut self, bytes: usize) -> Self {
        self.max_content_bytes = bytes.max(1);
        self
    }

    pub fn with_chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes.max(1024);
        self
    }

    pub fn with_overlap_bytes(mut self, bytes: usize) -> Self {
        self.overlap_bytes = bytes;
        self
    }

    pub fn with_drift_threshold(mut self, threshold: f32) -> Self {
        self.drift_threshold = threshold.clamp(0.0, 2.0);
        self
    }

    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = bucket.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.max_content_bytes, 512_000);
        assert_eq!(cfg.chunk_bytes, 102_400);
        assert_eq!(cfg.overlap_bytes, 1024);
        assert!((cfg.drift_threshold - 0.05).abs() < 1e-9);
    }

    #[test]
    fn builders_clamp() {
        let cfg = IngestConfig::new()
            .with_chunk_bytes(10)
            .with_drift_threshold(9.0);
        assert_eq!(cfg.chunk_bytes, 1024);
        assert_eq!(cfg.drift_threshold, 2.0);
    }
}
