//! YAML configuration for the Anchor core.
//!
//! The external config loader hands the core one structured object; this
//! module defines its shape, defaults, and validation, and projects the
//! sections into the narrow configs the member crates take.
//!
//! ## Example
//!
//! ```yaml
//! server:
//!   host: "127.0.0.1"
//!   port: 7151
//! search:
//!   max_chars_default: 524288
//!   code_weight_default: 1.0
//! ingest:
//!   max_content_bytes: 512000
//!   chunk_bytes: 102400
//!   overlap_bytes: 1024
//! vector:
//!   dim: 384
//!   drift_threshold: 0.05
//! resource:
//!   heap_critical_pct: 0.75
//! buckets:
//!   default: "inbox"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::ResourceConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// The full core configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub server: ServerSection,
    pub search: SearchSection,
    pub ingest: IngestSection,
    pub vector: VectorSection,
    pub resource: ResourceSection,
    pub buckets: BucketsSection,
}

impl AnchorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AnchorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_chars_default == 0 {
            return Err(ConfigError::Validation(
                "search.max_chars_default must be >= 1".into(),
            ));
        }
        if self.search.max_chars_default > self.search.max_chars_limit {
            return Err(ConfigError::Validation(
                "search.max_chars_default must not exceed search.max_chars_limit".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.code_weight_default) {
            return Err(ConfigError::Validation(
                "search.code_weight_default must be within [0, 1]".into(),
            ));
        }
        if self.ingest.chunk_bytes == 0 || self.ingest.max_content_bytes == 0 {
            return Err(ConfigError::Validation(
                "ingest sizes must be >= 1".into(),
            ));
        }
        if self.ingest.overlap_bytes >= self.ingest.chunk_bytes {
            return Err(ConfigError::Validation(
                "ingest.overlap_bytes must be smaller than ingest.chunk_bytes".into(),
            ));
        }
        if self.vector.dim == 0 {
            return Err(ConfigError::Validation("vector.dim must be >= 1".into()));
        }
        if !(0.0..=2.0).contains(&self.vector.drift_threshold) {
            return Err(ConfigError::Validation(
                "vector.drift_threshold must be a cosine distance in [0, 2]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resource.heap_critical_pct) {
            return Err(ConfigError::Validation(
                "resource.heap_critical_pct must be within [0, 1]".into(),
            ));
        }
        if self.buckets.default.trim().is_empty() {
            return Err(ConfigError::Validation(
                "buckets.default must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn search_config(&self) -> search::SearchConfig {
        search::SearchConfig {
            max_chars_default: self.search.max_chars_default,
            max_chars_limit: self.search.max_chars_limit,
            code_weight_default: self.search.code_weight_default,
            ..search::SearchConfig::default()
        }
    }

    pub fn ingest_config(&self) -> ingest::IngestConfig {
        ingest::IngestConfig::new()
            .with_max_content_bytes(self.ingest.max_content_bytes)
            .with_chunk_bytes(self.ingest.chunk_bytes)
            .with_overlap_bytes(self.ingest.overlap_bytes)
            .with_drift_threshold(self.vector.drift_threshold)
            .with_default_bucket(self.buckets.default.clone())
    }

    pub fn vector_config(&self) -> vector::VectorConfig {
        vector::VectorConfig::new(self.vector.dim)
    }

    pub fn embed_config(&self) -> embed::EmbedConfig {
        embed::EmbedConfig::new().with_dim(self.vector.dim)
    }

    pub fn resource_config(&self) -> ResourceConfig {
        ResourceConfig {
            heap_ceiling_bytes: self.resource.heap_ceiling_bytes,
            heap_critical_pct: self.resource.heap_critical_pct,
            memory_monitor_interval_ms: self.resource.memory_monitor_interval_ms,
            gc_cooldown_ms: self.resource.gc_cooldown_ms,
        }
    }
}

/// Bind target, consumed by the HTTP collaborator only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7151,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_chars_default: usize,
    pub max_chars_limit: usize,
    pub code_weight_default: f32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_chars_default: 524_288,
            max_chars_limit: 4 * 1024 * 1024,
            code_weight_default: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub max_content_bytes: usize,
    pub chunk_bytes: usize,
    pub overlap_bytes: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_content_bytes: 500 * 1024,
            chunk_bytes: 100 * 1024,
            overlap_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub dim: usize,
    pub drift_threshold: f32,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            dim: 384,
            drift_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSection {
    pub heap_ceiling_bytes: u64,
    pub heap_critical_pct: f64,
    pub memory_monitor_interval_ms: u64,
    pub gc_cooldown_ms: u64,
}

impl Default for ResourceSection {
    fn default() -> Self {
        Self {
            heap_ceiling_bytes: 1024 * 1024 * 1024,
            heap_critical_pct: 0.75,
            memory_monitor_interval_ms: 5_000,
            gc_cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketsSection {
    pub default: String,
    pub extra_watched_paths: Vec<String>,
}

impl Default for BucketsSection {
    fn default() -> Self {
        Self {
            default: "default".to_string(),
            extra_watched_paths: Vec::new(),
        }
    }
}
