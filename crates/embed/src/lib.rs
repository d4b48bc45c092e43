//! Embedding contract for Anchor.
//!
//! The core only requires *some* fixed-dimension vector per molecule with a
//! consistent distance metric; the concrete model is deployment
//! configuration. This crate defines the [`Embedder`] trait the pipeline and
//! the search executor consume, plus [`HashEmbedder`], a deterministic
//! zero-dependency embedder that derives sinusoid lanes from a hash of the
//! input. It is cheap, reproducible across runs, and good enough for the
//! drift gate and the hybrid channel in tests and offline deployments.

use fxhash::hash64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by embedding backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmbedError {
    #[error("embedding dimension must be >= 1, got {0}")]
    InvalidDimension(usize),
    #[error("embedder backend failure: {0}")]
    Backend(String),
}

/// Configuration for the default embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Output dimensionality. Must match `vector.dim` in the runtime config.
    pub dim: usize,
    /// Whether vectors are L2-normalized before being returned.
    pub normalize: bool,
    /// Informational model identifier carried into logs.
    pub model_name: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            normalize: true,
            model_name: "anchor-hash-v1".to_string(),
        }
    }
}

impl EmbedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// A fixed-dimension text embedder.
///
/// Implementations must be deterministic for a given input: the ingestion
/// pipeline relies on identical text re-embedding to the identical vector so
/// that replayed ingests stay idempotent.
pub trait Embedder: Send + Sync {
    /// Embed `text` into a vector of exactly [`Embedder::dim`] lanes.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output dimensionality, constant for the embedder's lifetime.
    fn dim(&self) -> usize;
}

/// Deterministic embedder: sinusoid lanes seeded by a 64-bit hash of the
/// input text, optionally L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    cfg: EmbedConfig,
}

impl HashEmbedder {
    pub fn new(cfg: EmbedConfig) -> Result<Self, EmbedError> {
        if cfg.dim == 0 {
            return Err(EmbedError::InvalidDimension(cfg.dim));
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.cfg
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let h = hash64(text.as_bytes());
        let mut v = vec![0f32; self.cfg.dim];
        for (idx, lane) in v.iter_mut().enumerate() {
            let mixed = h.rotate_left((idx % 64) as u32) ^ (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            *lane = ((mixed >> 32) as f32 * 1e-9).sin();
        }
        if self.cfg.normalize {
            l2_normalize_in_place(&mut v);
        }
        Ok(v)
    }

    fn dim(&self) -> usize {
        self.cfg.dim
    }
}

/// Scale `v` to unit length. Zero vectors are left untouched.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(EmbedConfig::default()).unwrap()
    }

    #[test]
    fn embed_produces_configured_dimension() {
        let v = embedder().embed("hello world").unwrap();
        assert_eq!(v.len(), 384);
    }

    #[test]
    fn embed_is_deterministic() {
        let e = embedder();
        assert_eq!(e.embed("same text").unwrap(), e.embed("same text").unwrap());
    }

    #[test]
    fn different_text_differs() {
        let e = embedder();
        assert_ne!(e.embed("hello").unwrap(), e.embed("world").unwrap());
    }

    #[test]
    fn normalized_vectors_have_unit_norm() {
        let v = embedder().embed("normalize me").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn unnormalized_values_stay_in_sin_range() {
        let e = HashEmbedder::new(EmbedConfig::new().with_normalize(false)).unwrap();
        for &x in e.embed("range check").unwrap().iter() {
            assert!((-1.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn zero_dimension_rejected() {
        let err = HashEmbedder::new(EmbedConfig::new().with_dim(0)).unwrap_err();
        assert_eq!(err, EmbedError::InvalidDimension(0));
    }

    #[test]
    fn unicode_input_embeds() {
        let v = embedder().embed("Hello 🌍 World 世界").unwrap();
        assert_eq!(v.len(), 384);
        assert!(!v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn empty_input_embeds_to_nonzero_vector() {
        let v = embedder().embed("").unwrap();
        assert_eq!(v.len(), 384);
        assert!(!v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn custom_dimension_respected() {
        let e = HashEmbedder::new(EmbedConfig::new().with_dim(32)).unwrap();
        assert_eq!(e.dim(), 32);
        assert_eq!(e.embed("dim").unwrap().len(), 32);
    }
}
