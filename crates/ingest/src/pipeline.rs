//! Pipeline orchestration: atomize → embed → drift gate → batch commit.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use atomize::{
    atomize_segment, canonical_body, compound_id, AtomPosition, ByteRange, Compound, Molecule,
    Provenance, TagEdge, VariantEdge,
};
use embed::Embedder;
use fingerprint::simhash;
use store::{Store, WriteBatch};
use vector::VectorIndex;

use crate::chunker::{windows, ChunkPlan};
use crate::config::IngestConfig;
use crate::error::IngestError;

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub content: Vec<u8>,
    pub source: String,
    pub provenance: Provenance,
    pub buckets: Vec<String>,
    pub user_tags: Vec<String>,
}

/// Outcome classification for an ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// A new compound was written.
    Stored,
    /// The compound already existed; the replay was a no-op upsert.
    Unchanged,
}

/// What an ingest produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub compound_id: String,
    pub n_molecules: usize,
    pub n_entities: usize,
    pub n_variants: usize,
    pub warnings: Vec<String>,
}

/// The ingestion pipeline. Construct once, share behind an `Arc`.
pub struct IngestPipeline {
    store: Arc<Store>,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    cfg: IngestConfig,
    shutdown: Arc<AtomicBool>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<Store>,
        vectors: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        cfg: IngestConfig,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            cfg,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between streaming windows; set it to stop gracefully.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn store_handle(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn vector_handle(&self) -> Arc<VectorIndex> {
        self.vectors.clone()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.cfg
    }

    /// Ingest one document.
    ///
    /// Bodies at or under the size gate commit in a single transaction;
    /// larger bodies stream window by window, each window committing its own
    /// transaction in file order so molecule sequences stay deterministic.
    pub fn ingest(&self, req: IngestRequest) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        match self.ingest_inner(&req) {
            Ok(report) => {
                info!(
                    source = %req.source,
                    compound_id = %report.compound_id,
                    n_molecules = report.n_molecules,
                    n_entities = report.n_entities,
                    n_variants = report.n_variants,
                    status = ?report.status,
                    elapsed_micros = started.elapsed().as_micros() as u64,
                    "ingest_success"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(
                    source = %req.source,
                    error = %err,
                    elapsed_micros = started.elapsed().as_micros() as u64,
                    "ingest_failure"
                );
                Err(err)
            }
        }
    }

    fn ingest_inner(&self, req: &IngestRequest) -> Result<IngestReport, IngestError> {
        let raw = std::str::from_utf8(&req.content)
            .map_err(|e| IngestError::InvalidUtf8(e.to_string()))?;
        let body = canonical_body(raw);
        if body.trim().is_empty() {
            return Err(IngestError::EmptyContent);
        }

        let id = compound_id(&req.source, &body);
        let mut buckets: Vec<String> = if req.buckets.is_empty() {
            vec![self.cfg.default_bucket.clone()]
        } else {
            req.buckets.clone()
        };
        let mut status = IngestStatus::Stored;
        if let Some(existing) = self.store.compound_meta(&id)? {
            status = IngestStatus::Unchanged;
            for bucket in existing.buckets {
                if !buckets.contains(&bucket) {
                    buckets.push(bucket);
                }
            }
        }

        // Size gate: the raw content length decides the path, so a body of
        // exactly the limit stays single-shot.
        let window_ranges = if req.content.len() > self.cfg.max_content_bytes {
            windows(&body, ChunkPlan::from(&self.cfg))
        } else {
            vec![ByteRange {
                start: 0,
                end: body.len(),
            }]
        };

        let signature = simhash(&body, &self.cfg.atomize.fingerprint);
        let mut compound = Compound {
            id: id.clone(),
            body,
            source: req.source.clone(),
            ingested_at: Utc::now(),
            provenance: req.provenance,
            signature,
            buckets,
        };

        let mut totals = IngestReport {
            status,
            compound_id: id.clone(),
            n_molecules: 0,
            n_entities: 0,
            n_variants: 0,
            warnings: Vec::new(),
        };
        let mut next_sequence = 0u32;
        let mut emitted_until = 0usize;
        let mut all_variants = true;

        for (window_index, window) in window_ranges.iter().enumerate() {
            if window_index > 0 && self.shutdown.load(Ordering::Relaxed) {
                totals
                    .warnings
                    .push("shutdown requested; ingest stopped between windows".to_string());
                break;
            }
            // Windows overlap for break-point context, but emission is
            // disjoint: each window atomizes only the bytes past the
            // previous window's end.
            let seg_start = emitted_until.max(window.start);
            if seg_start >= window.end {
                continue;
            }
            emitted_until = window.end;
            let segment = ByteRange {
                start: seg_start,
                end: window.end,
            };

            let (mut molecules, atoms) =
                atomize_segment(&compound.body, segment, &id, next_sequence, &self.cfg.atomize)?;
            if molecules.is_empty() {
                continue;
            }
            next_sequence = molecules.last().map(|m| m.sequence + 1).unwrap_or(next_sequence);

            let mut batch = self.store.begin(&req.source)?;
            let mut acc = BatchAccumulator::default();
            let mut pending_adds: Vec<(u64, Vec<f32>)> = Vec::new();
            let mut window_variants = 0usize;

            for molecule in &mut molecules {
                match self.embedder.embed(&molecule.content) {
                    Ok(embedding) => {
                        let gate = self.drift_gate(&mut batch, molecule, &embedding)?;
                        molecule.embedding = embedding;
                        match gate {
                            DriftOutcome::Fresh(vid) => {
                                pending_adds.push((vid, molecule.embedding.clone()));
                                all_variants = false;
                            }
                            DriftOutcome::Replay => {
                                all_variants = false;
                            }
                            DriftOutcome::Variant(edge) => {
                                window_variants += 1;
                                acc.variant_edges.push(edge);
                            }
                        }
                    }
                    Err(err) => {
                        totals
                            .warnings
                            .push(format!("embedding failed for {}: {err}", molecule.id));
                        all_variants = false;
                    }
                }
            }

            for atom in &atoms {
                let molecule = molecules.iter().find(|m| m.id == atom.molecule_id);
                let Some(molecule) = molecule else { continue };
                let offset = find_term_ci(&molecule.content, &atom.label)
                    .map(|rel| molecule.range.start + rel)
                    .unwrap_or(molecule.range.start);
                acc.add_position(&atom.label, &id, offset as u64);
                for tag in &molecule.tags {
                    acc.add_edge(&atom.id, tag.as_str(), &compound.buckets);
                }
                for tag in &req.user_tags {
                    acc.add_edge(&atom.id, tag, &compound.buckets);
                }
            }
            for molecule in &molecules {
                for tag in &molecule.tags {
                    acc.add_position(tag.as_str(), &id, molecule.range.start as u64);
                }
                for tag in &req.user_tags {
                    // Oversized tags are skipped by the edge writer with a
                    // warning; keep them out of the census too.
                    if tag.len() <= atomize::MAX_TAG_BYTES {
                        acc.add_position(tag, &id, molecule.range.start as u64);
                    }
                }
            }

            compound.provenance = if all_variants && (totals.n_molecules + molecules.len()) > 0 {
                Provenance::Variant
            } else {
                req.provenance
            };

            batch.put_compound(&compound)?;
            batch.put_molecule_batch(&molecules)?;
            batch.put_atoms(&atoms)?;
            batch.put_atom_positions(&acc.positions)?;
            batch.put_tag_edges(&acc.edges)?;
            for edge in &acc.variant_edges {
                batch.put_variant_edge(edge)?;
            }
            let warnings = batch.commit()?;
            totals.warnings.extend(warnings);

            // Vector inserts land only after a successful commit; a crash in
            // between is repaired by the startup rebuild.
            for (vid, embedding) in pending_adds {
                self.vectors.add(vid, &embedding)?;
            }

            totals.n_molecules += molecules.len();
            totals.n_entities += atoms.len();
            totals.n_variants += window_variants;
        }

        Ok(totals)
    }

    /// The drift gate: decide whether a molecule is new, a replay of itself,
    /// or a near-duplicate of something already indexed.
    fn drift_gate(
        &self,
        batch: &mut WriteBatch,
        molecule: &mut Molecule,
        embedding: &[f32],
    ) -> Result<DriftOutcome, IngestError> {
        if let Some((vid, distance)) = self.vectors.nearest(embedding)? {
            if distance < self.cfg.drift_threshold {
                let neighbor = self.store.vector_molecule(vid)?;
                match neighbor {
                    Some(neighbor_id) if neighbor_id == molecule.id => {
                        molecule.vector_id = Some(vid);
                        return Ok(DriftOutcome::Replay);
                    }
                    Some(neighbor_id) => {
                        molecule.vector_id = None;
                        return Ok(DriftOutcome::Variant(VariantEdge {
                            source_id: molecule.id.clone(),
                            target_id: neighbor_id,
                            weight: (1.0 - distance) as f64,
                        }));
                    }
                    // Mapping missing (index ahead of store): treat as new.
                    None => {}
                }
            }
        }
        let vid = batch.next_vector_id()?;
        batch.put_vector_mapping(vid, &molecule.id)?;
        molecule.vector_id = Some(vid);
        Ok(DriftOutcome::Fresh(vid))
    }
}

enum DriftOutcome {
    Fresh(u64),
    Replay,
    Variant(VariantEdge),
}

/// Scoped dedup state for one batch: keys are computed here and discarded
/// with the builder.
#[derive(Default)]
struct BatchAccumulator {
    positions: Vec<AtomPosition>,
    edges: Vec<TagEdge>,
    variant_edges: Vec<VariantEdge>,
    seen_positions: HashSet<(String, String, u64)>,
    seen_edges: HashSet<(String, String, String)>,
}

impl BatchAccumulator {
    fn add_position(&mut self, term: &str, compound_id: &str, byte_offset: u64) {
        let key = (term.to_string(), compound_id.to_string(), byte_offset);
        if self.seen_positions.insert(key) {
            self.positions.push(AtomPosition {
                term: term.to_string(),
                compound_id: compound_id.to_string(),
                byte_offset,
            });
        }
    }

    fn add_edge(&mut self, atom_id: &str, tag: &str, buckets: &[String]) {
        for bucket in buckets {
            let key = (atom_id.to_string(), tag.to_string(), bucket.clone());
            if self.seen_edges.insert(key) {
                self.edges.push(TagEdge {
                    atom_id: atom_id.to_string(),
                    tag: tag.to_string(),
                    bucket: bucket.clone(),
                });
            }
        }
    }
}

/// Case-insensitive substring search returning the byte offset of the first
/// match. Works char-by-char so multi-byte lowercase folds never misalign
/// offsets.
fn find_term_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    let hay: Vec<(usize, char)> = haystack.char_indices().collect();
    'outer: for start in 0..hay.len() {
        let mut k = 0usize;
        let mut j = start;
        while k < needle_chars.len() {
            if j >= hay.len() {
                continue 'outer;
            }
            for folded in hay[j].1.to_lowercase() {
                if k >= needle_chars.len() {
                    break;
                }
                if folded != needle_chars[k] {
                    continue 'outer;
                }
                k += 1;
            }
            j += 1;
        }
        return Some(hay[start].0);
    }
    None
}
