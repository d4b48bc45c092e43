//! Approximate nearest-neighbor index over molecule embeddings.
//!
//! Below a configurable vector count the index answers queries with an exact
//! linear scan; above it, a Hierarchical Navigable Small World graph is built
//! lazily on first search and reused until new vectors arrive. Distances are
//! cosine; [`similarity`] converts them to a `[0, 1]` score.
//!
//! The index is a single in-memory structure behind a reader-preferred lock:
//! many concurrent searches, rare inserts. Persistence is the store's job —
//! on startup the runtime replays stored `(vector_id, embedding)` pairs back
//! into a fresh index.

use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the vector index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Configuration for index construction and search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Embedding dimensionality.
    pub dim: usize,
    /// Neighbors per HNSW node.
    pub m: usize,
    /// Candidate-list size during graph construction.
    pub ef_construction: usize,
    /// Candidate-list size during search.
    pub ef_search: usize,
    /// Below this many vectors, searches use an exact linear scan.
    pub min_vectors_for_graph: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            min_vectors_for_graph: 1000,
        }
    }
}

impl VectorConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    pub fn with_min_vectors_for_graph(mut self, min: usize) -> Self {
        self.min_vectors_for_graph = min;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }
}

/// Convert a cosine distance into a similarity score in `[0, 1]`.
pub fn similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

struct Inner {
    cfg: VectorConfig,
    vectors: Vec<Vec<f32>>,
    slot_ids: Vec<u64>,
    id_to_slot: std::collections::HashMap<u64, usize>,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    built: bool,
}

impl Inner {
    fn needs_build(&self) -> bool {
        !self.built && self.vectors.len() >= self.cfg.min_vectors_for_graph
    }

    fn build(&mut self) {
        let nb_elem = self.vectors.len();
        if nb_elem < self.cfg.min_vectors_for_graph {
            self.built = true;
            return;
        }
        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.cfg.m,
            nb_elem,
            nb_layer,
            self.cfg.ef_construction,
            DistCosine {},
        );
        let data: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, vec)| (vec, slot))
            .collect();
        hnsw.parallel_insert(&data);
        self.hnsw = Some(hnsw);
        self.built = true;
        debug!(vectors = nb_elem, "vector_graph_built");
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        if let (true, Some(hnsw)) = (
            self.built && self.vectors.len() >= self.cfg.min_vectors_for_graph,
            self.hnsw.as_ref(),
        ) {
            let neighbours: Vec<Neighbour> = hnsw.search(query, k, self.cfg.ef_search);
            return neighbours
                .into_iter()
                .map(|n| (self.slot_ids[n.get_origin_id()], n.distance))
                .collect();
        }
        // Exact scan fallback.
        let mut scored: Vec<(u64, f32)> = self
            .vectors
            .iter()
            .zip(&self.slot_ids)
            .map(|(vec, &id)| (id, cosine_distance(query, vec)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Shared in-memory ANN index keyed by vector id.
pub struct VectorIndex {
    inner: RwLock<Inner>,
}

impl VectorIndex {
    pub fn new(cfg: VectorConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                cfg,
                vectors: Vec::new(),
                slot_ids: Vec::new(),
                id_to_slot: std::collections::HashMap::new(),
                hnsw: None,
                built: false,
            }),
        }
    }

    /// Insert an embedding under `vector_id`. Re-adding an existing id is a
    /// no-op, which keeps ingest replays idempotent.
    pub fn add(&self, vector_id: u64, embedding: &[f32]) -> Result<(), VectorError> {
        let mut inner = self.inner.write();
        if embedding.len() != inner.cfg.dim {
            return Err(VectorError::DimensionMismatch {
                expected: inner.cfg.dim,
                got: embedding.len(),
            });
        }
        if inner.id_to_slot.contains_key(&vector_id) {
            return Ok(());
        }
        let slot = inner.vectors.len();
        inner.vectors.push(embedding.to_vec());
        inner.slot_ids.push(vector_id);
        inner.id_to_slot.insert(vector_id, slot);
        inner.built = false;
        Ok(())
    }

    /// K nearest neighbors as `(vector_id, cosine_distance)`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, VectorError> {
        {
            let inner = self.inner.read();
            if query.len() != inner.cfg.dim {
                return Err(VectorError::DimensionMismatch {
                    expected: inner.cfg.dim,
                    got: query.len(),
                });
            }
            if !inner.needs_build() {
                return Ok(inner.search(query, k));
            }
        }
        let mut inner = self.inner.write();
        if inner.needs_build() {
            inner.build();
        }
        Ok(inner.search(query, k))
    }

    /// The single nearest neighbor, if any vector is indexed.
    pub fn nearest(&self, query: &[f32]) -> Result<Option<(u64, f32)>, VectorError> {
        Ok(self.search(query, 1)?.into_iter().next())
    }

    pub fn contains(&self, vector_id: u64) -> bool {
        self.inner.read().id_to_slot.contains_key(&vector_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.inner.read().cfg.dim
    }
}

/// Cosine distance (`1 − cosine similarity`); lower is closer.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_index() -> VectorIndex {
        VectorIndex::new(VectorConfig::new(3))
    }

    // ==================== Insert and lookup ====================

    #[test]
    fn add_and_search_exact() {
        let index = small_index();
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0]).unwrap();
        index.add(3, &[0.9, 0.1, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 < 1e-6);
        assert_eq!(hits[1].0, 3);
    }

    #[test]
    fn nearest_returns_closest() {
        let index = small_index();
        index.add(10, &[0.0, 0.0, 1.0]).unwrap();
        index.add(11, &[0.0, 1.0, 0.0]).unwrap();
        let (id, d) = index.nearest(&[0.0, 0.1, 0.99]).unwrap().unwrap();
        assert_eq!(id, 10);
        assert!(d < 0.1);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = small_index();
        assert!(index.nearest(&[1.0, 0.0, 0.0]).unwrap().is_none());
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn duplicate_ids_are_idempotent() {
        let index = small_index();
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let index = small_index();
        let err = index.add(1, &[1.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            VectorError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        );
        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { .. }));
    }

    #[test]
    fn contains_reflects_membership() {
        let index = small_index();
        assert!(!index.contains(5));
        index.add(5, &[0.0, 1.0, 0.0]).unwrap();
        assert!(index.contains(5));
    }

    // ==================== Graph path ====================

    #[test]
    fn graph_path_agrees_with_linear_on_top_hit() {
        let cfg = VectorConfig::new(4).with_min_vectors_for_graph(16);
        let graph = VectorIndex::new(cfg);
        let linear = VectorIndex::new(VectorConfig::new(4));

        for i in 0..64u64 {
            let f = i as f32;
            let v = [f.sin(), f.cos(), (f * 0.5).sin(), (f * 0.5).cos()];
            graph.add(i, &v).unwrap();
            linear.add(i, &v).unwrap();
        }

        let query = [0.9f32.sin(), 0.9f32.cos(), 0.45f32.sin(), 0.45f32.cos()];
        let g = graph.nearest(&query).unwrap().unwrap();
        let l = linear.nearest(&query).unwrap().unwrap();
        assert_eq!(g.0, l.0);
    }

    #[test]
    fn inserts_after_build_are_searchable() {
        let cfg = VectorConfig::new(2).with_min_vectors_for_graph(4);
        let index = VectorIndex::new(cfg);
        for i in 0..8u64 {
            index.add(i, &[(i as f32).sin(), (i as f32).cos()]).unwrap();
        }
        index.search(&[0.5, 0.5], 1).unwrap();
        index.add(100, &[0.7071, 0.7071]).unwrap();
        let hits = index.search(&[0.7071, 0.7071], 1).unwrap();
        assert_eq!(hits[0].0, 100);
    }

    // ==================== Similarity conversion ====================

    #[test]
    fn similarity_maps_into_unit_interval() {
        assert!((similarity(0.0) - 1.0).abs() < 1e-6);
        assert!((similarity(2.0)).abs() < 1e-6);
        assert!((similarity(1.0) - 0.5).abs() < 1e-6);
        assert_eq!(similarity(5.0), 0.0);
    }

    #[test]
    fn identical_vectors_have_zero_distance() {
        let v = [0.3, 0.4, 0.5];
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn zero_vector_is_maximally_distant() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
