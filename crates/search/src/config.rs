//! Configuration for search planning and execution.

use serde::{Deserialize, Serialize};

/// Runtime configuration for the search layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Byte budget applied when a request does not specify one.
    pub max_chars_default: usize,
    /// Hard ceiling on any request's byte budget.
    pub max_chars_limit: usize,
    /// Code-penalty multiplier applied when a request does not specify one.
    pub code_weight_default: f32,
    /// Census rows fetched per term.
    pub per_term_cap: usize,
    /// Elastic radius clamp, in bytes.
    pub min_radius: usize,
    pub max_radius: usize,
    /// Vector neighbors consulted by the hybrid channel.
    pub vector_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_chars_default: 524_288,
            max_chars_limit: 4 * 1024 * 1024,
            code_weight_default: 1.0,
            per_term_cap: 50,
            min_radius: 200,
            max_radius: 32_000,
            vector_top_k: 10,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chars_default(mut self, bytes: usize) -> Self {
        self.max_chars_default = bytes.max(1);
        self
    }

    pub fn with_per_term_cap(mut self, cap: usize) -> Self {
        self.per_term_cap = cap.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = SearchConfig::default();
        assert_eq!(cfg.max_chars_default, 524_288);
        assert_eq!(cfg.per_term_cap, 50);
        assert_eq!(cfg.min_radius, 200);
        assert_eq!(cfg.max_radius, 32_000);
        assert!((cfg.code_weight_default - 1.0).abs() < 1e-9);
    }
}
