//! The radial search executor.
//!
//! Phases run in a fixed order: census → elastic radius → inflation →
//! scoring → dedupe/fold → packing. Failures before inflation return an
//! empty, typed response; failures after it are absorbed — the query returns
//! whatever context is ready with `metadata.partial = true`. The packed
//! context never exceeds the plan's byte budget.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use atomize::{looks_like_code, ByteRange, Molecule, Provenance};
use embed::Embedder;
use store::CompoundMeta;
use vector::{similarity, VectorIndex};

use crate::config::SearchConfig;
use crate::source::ContextSource;
use crate::types::{
    Plan, QueryPhase, SearchContext, SearchMetadata, SearchResponse, SearchResult,
};

const BASE_SCORE: f32 = 10.0;
const DIRECT_TERM_SCORE: f32 = 100.0;
const RELATED_TERM_SCORE: f32 = 40.0;
const INTERSECTION_FACTOR: f32 = 50.0;
const AGGREGATION_FACTOR: f32 = 0.2;
const TEMPORAL_BOOST: f32 = 1.5;
const VECTOR_FACTOR: f32 = 100.0;

/// Tags that mark machine-shaped content for the code penalty.
const CODE_TAGS: [&str; 5] = ["code", "technical", "json", "config", "test"];
/// Tags that exempt a window from the code penalty.
const HUMAN_TAGS: [&str; 4] = ["narrative", "relationship", "social", "personal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    Direct,
    Related,
}

struct Window {
    compound_id: String,
    start: usize,
    end: usize,
    score: f32,
    hits: u32,
}

struct Inflated {
    compound_id: String,
    start: usize,
    end: usize,
    content: String,
    score: f32,
    hits: u32,
}

/// Executes plans against a [`ContextSource`], optionally consulting the
/// vector index as a hybrid channel.
pub struct SearchExecutor<'a, S: ContextSource + Sync> {
    source: &'a S,
    vectors: Option<&'a VectorIndex>,
    embedder: Option<&'a dyn Embedder>,
    cfg: &'a SearchConfig,
}

impl<'a, S: ContextSource + Sync> SearchExecutor<'a, S> {
    pub fn new(source: &'a S, cfg: &'a SearchConfig) -> Self {
        Self {
            source,
            vectors: None,
            embedder: None,
            cfg,
        }
    }

    /// Enable the hybrid channel. Without it, scoring is text-only.
    pub fn with_vectors(mut self, vectors: &'a VectorIndex, embedder: &'a dyn Embedder) -> Self {
        self.vectors = Some(vectors);
        self.embedder = Some(embedder);
        self
    }

    /// Run the full pipeline for one plan.
    pub fn search(&self, plan: &Plan, ctx: &SearchContext) -> SearchResponse {
        let started = Instant::now();
        let mut partial = false;
        let mut first_error: Option<String> = None;

        // ---- (a) Census ----
        let mut term_rows: Vec<(TermKind, String, Vec<(String, u64)>)> = Vec::new();
        let mut census_failures = 0usize;
        let terms = plan
            .direct_terms
            .iter()
            .map(|t| (TermKind::Direct, t))
            .chain(plan.related_terms.iter().map(|t| (TermKind::Related, t)));
        for (kind, term) in terms {
            match self.source.census(term, &ctx.filters, self.cfg.per_term_cap) {
                Ok(rows) if !rows.is_empty() => term_rows.push((kind, term.clone(), rows)),
                Ok(_) => {}
                Err(err) => {
                    census_failures += 1;
                    first_error.get_or_insert_with(|| err.to_string());
                }
            }
        }
        let total_hits: usize = term_rows.iter().map(|(_, _, rows)| rows.len()).sum();
        if total_hits == 0 {
            if census_failures > 0 {
                warn!(error = ?first_error, "search_census_failed");
                let mut response =
                    SearchResponse::empty("empty", QueryPhase::CensusDone, first_error);
                response.metadata.elapsed_micros = started.elapsed().as_micros() as u64;
                return response;
            }
            debug!("search_no_hits");
            let mut response = SearchResponse::empty("empty", QueryPhase::CensusDone, None);
            response.metadata.elapsed_micros = started.elapsed().as_micros() as u64;
            return response;
        }
        if census_failures > 0 {
            partial = true;
        }

        // ---- (b) Elastic radius ----
        let radius = (plan.max_chars / total_hits / 2).clamp(self.cfg.min_radius, self.cfg.max_radius);
        let max_window = 4 * radius;

        // ---- (c) Window layout and inflation ----
        let n_direct = plan.direct_terms.len().max(1);
        let n_related = plan.related_terms.len().max(1);
        let direct_budget = plan.max_chars * 7 / 10;
        let related_budget = plan.max_chars - direct_budget;

        let mut meta_cache: HashMap<String, Option<CompoundMeta>> = HashMap::new();
        let mut by_compound: HashMap<String, Vec<Window>> = HashMap::new();
        for (kind, _term, rows) in &term_rows {
            let (term_budget, term_score) = match kind {
                TermKind::Direct => (direct_budget / n_direct, DIRECT_TERM_SCORE),
                TermKind::Related => (related_budget / n_related, RELATED_TERM_SCORE),
            };
            let cap = (term_budget / (2 * radius)).max(3);
            for (compound_id, offset) in rows.iter().take(cap) {
                let meta = meta_cache
                    .entry(compound_id.clone())
                    .or_insert_with(|| self.source.compound_meta(compound_id).unwrap_or(None));
                let Some(meta) = meta.as_ref() else { continue };
                let body_len = meta.body_len as usize;
                let center = *offset as usize;
                let start = center.saturating_sub(radius);
                let end = (center + radius).min(body_len);
                if start >= end {
                    continue;
                }
                by_compound
                    .entry(compound_id.clone())
                    .or_default()
                    .push(Window {
                        compound_id: compound_id.clone(),
                        start,
                        end,
                        score: term_score + BASE_SCORE,
                        hits: 1,
                    });
            }
        }

        let mut merged: Vec<Window> = Vec::new();
        for (_, mut windows) in by_compound {
            windows.sort_by_key(|w| w.start);
            let mut iter = windows.into_iter();
            let Some(mut current) = iter.next() else { continue };
            for next in iter {
                let would_span = next.end.max(current.end) - current.start;
                if next.start <= current.end && would_span <= max_window {
                    current.end = current.end.max(next.end);
                    current.score += AGGREGATION_FACTOR * next.score;
                    current.hits += next.hits;
                } else {
                    merged.push(current);
                    current = next;
                }
            }
            merged.push(current);
        }

        let deadline_hit = AtomicBool::new(false);
        let read_failures = AtomicUsize::new(0);
        let inflated: Vec<Inflated> = merged
            .par_iter()
            .filter_map(|w| {
                if let Some(deadline) = plan.deadline {
                    if Instant::now() >= deadline {
                        deadline_hit.store(true, Ordering::Relaxed);
                        return None;
                    }
                }
                let range = ByteRange {
                    start: w.start,
                    end: w.end,
                };
                match self.source.read_slice(&w.compound_id, range) {
                    Ok(content) if !content.is_empty() => Some(Inflated {
                        compound_id: w.compound_id.clone(),
                        start: w.start,
                        end: w.end,
                        content,
                        score: w.score,
                        hits: w.hits,
                    }),
                    Ok(_) => None,
                    Err(_) => {
                        read_failures.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                }
            })
            .collect();
        if read_failures.load(Ordering::Relaxed) > 0 || deadline_hit.load(Ordering::Relaxed) {
            partial = true;
        }

        // ---- (d) Scoring ----
        let mut molecule_cache: HashMap<String, Vec<Molecule>> = HashMap::new();
        let mut results: Vec<SearchResult> = Vec::new();
        for w in inflated {
            let Some(Some(meta)) = meta_cache.get(&w.compound_id) else {
                continue;
            };
            let molecules = molecule_cache
                .entry(w.compound_id.clone())
                .or_insert_with(|| self.source.molecules_for(&w.compound_id).unwrap_or_default());
            let mut tags: Vec<String> = Vec::new();
            for m in molecules.iter() {
                if m.range.start < w.end && w.start < m.range.end {
                    for tag in &m.tags {
                        let s = tag.as_str().to_string();
                        if !tags.contains(&s) {
                            tags.push(s);
                        }
                    }
                }
            }

            let mut score = w.score;
            let lowered = w.content.to_lowercase();
            let matches = plan
                .direct_terms
                .iter()
                .filter(|t| lowered.contains(t.as_str()))
                .count() as f32;
            score += matches * matches * INTERSECTION_FACTOR;

            if let Some(requested) = &ctx.explicit_provenance {
                if meta.provenance == Provenance::Internal
                    && requested.contains(&Provenance::Internal)
                {
                    score *= 2.0;
                } else if meta.provenance == Provenance::External
                    && requested.contains(&Provenance::External)
                {
                    score *= 1.5;
                }
            }

            if plan.code_weight < 1.0 {
                let code_like = if tags.is_empty() {
                    looks_like_code(&w.content)
                } else {
                    tags.iter().any(|t| CODE_TAGS.contains(&t.as_str()))
                };
                let human = tags.iter().any(|t| HUMAN_TAGS.contains(&t.as_str()));
                if code_like && !human {
                    score *= plan.code_weight;
                }
            }

            if let Some((t0, t1)) = plan.temporal_window {
                if meta.ingested_at >= t0 && meta.ingested_at < t1 {
                    score *= TEMPORAL_BOOST;
                }
            }

            results.push(SearchResult {
                compound_id: w.compound_id,
                start_byte: w.start,
                end_byte: w.end,
                content: w.content,
                tags,
                provenance: meta.provenance,
                timestamp: meta.ingested_at,
                source: meta.source.clone(),
                score,
                hits: w.hits,
            });
        }

        // ---- (d') Vector hybrid ----
        let mut strategy = "radial";
        if let (Some(vectors), Some(embedder)) = (self.vectors, self.embedder) {
            if let Ok(query_embedding) = embedder.embed(&plan.query) {
                match vectors.search(&query_embedding, self.cfg.vector_top_k) {
                    Ok(neighbors) => {
                        for (vid, dist) in neighbors {
                            let molecule = self
                                .source
                                .vector_molecule(vid)
                                .ok()
                                .flatten()
                                .and_then(|id| self.source.molecule(&id).ok().flatten());
                            let Some(molecule) = molecule else { continue };
                            let vector_score = similarity(dist) * VECTOR_FACTOR;
                            for r in results.iter_mut() {
                                if r.compound_id == molecule.compound_id
                                    && molecule.range.start < r.end_byte
                                    && r.start_byte < molecule.range.end
                                {
                                    let text_score = r.score;
                                    r.score += vector_score + 0.5 * text_score.min(vector_score);
                                    strategy = "hybrid";
                                }
                            }
                        }
                    }
                    Err(err) => {
                        // Text-only fallback; the query still answers.
                        first_error.get_or_insert_with(|| err.to_string());
                        partial = true;
                    }
                }
            }
        }

        // ---- (e) Dedupe, aggregate, fold variants ----
        let mut keyed: HashMap<(String, usize), SearchResult> = HashMap::new();
        for r in results {
            let key = (r.compound_id.clone(), r.start_byte);
            match keyed.get_mut(&key) {
                Some(existing) => {
                    existing.hits += r.hits;
                    existing.score += AGGREGATION_FACTOR * r.score;
                }
                None => {
                    keyed.insert(key, r);
                }
            }
        }
        let mut results: Vec<SearchResult> = keyed.into_values().collect();
        if !ctx.include_variants {
            self.fold_variants(&mut results, &mut molecule_cache);
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        // ---- (f) Pack to budget ----
        let mut context = String::new();
        let mut packed: Vec<SearchResult> = Vec::new();
        for r in results {
            let remaining = plan.max_chars.saturating_sub(context.len());
            if remaining == 0 {
                break;
            }
            let header = format!("--- {} [{}] ---\n", r.source, r.provenance);
            if header.len() + 1 >= remaining {
                break;
            }
            let room = remaining - header.len() - 1;
            let body = truncate_at_boundary(&r.content, room);
            context.push_str(&header);
            context.push_str(body);
            context.push('\n');
            packed.push(r);
        }
        debug_assert!(context.len() <= plan.max_chars);

        info!(
            total_hits,
            radius,
            n_results = packed.len(),
            context_bytes = context.len(),
            partial,
            strategy,
            elapsed_micros = started.elapsed().as_micros() as u64,
            "search_done"
        );

        SearchResponse {
            context,
            results: packed,
            strategy: strategy.to_string(),
            metadata: SearchMetadata {
                partial,
                total_hits,
                radius,
                phase: QueryPhase::Returned,
                elapsed_micros: started.elapsed().as_micros() as u64,
                error: first_error,
            },
        }
    }

    /// Temporal folding: when a variant window and its original both made it
    /// into the result set, keep the newer variant and absorb the original's
    /// weight. History stays reachable via `include_variants`.
    fn fold_variants(
        &self,
        results: &mut Vec<SearchResult>,
        molecule_cache: &mut HashMap<String, Vec<Molecule>>,
    ) {
        let variant_compounds: Vec<String> = results
            .iter()
            .filter(|r| r.provenance == Provenance::Variant)
            .map(|r| r.compound_id.clone())
            .collect();
        if variant_compounds.is_empty() {
            return;
        }

        let mut folded_originals: HashSet<String> = HashSet::new();
        let mut absorbed: HashMap<String, f32> = HashMap::new();
        for compound_id in variant_compounds {
            let molecules = molecule_cache
                .entry(compound_id.clone())
                .or_insert_with(|| self.source.molecules_for(&compound_id).unwrap_or_default());
            let Some(first) = molecules.first() else { continue };
            let original_compound = self
                .source
                .variant_target(&first.id)
                .ok()
                .flatten()
                .and_then(|(target, _)| self.source.molecule(&target).ok().flatten())
                .map(|m| m.compound_id);
            let Some(original_compound) = original_compound else {
                continue;
            };
            if results.iter().any(|r| r.compound_id == original_compound) {
                let dropped: f32 = results
                    .iter()
                    .filter(|r| r.compound_id == original_compound)
                    .map(|r| r.score)
                    .sum();
                folded_originals.insert(original_compound);
                *absorbed.entry(compound_id).or_default() += AGGREGATION_FACTOR * dropped;
            }
        }
        if folded_originals.is_empty() {
            return;
        }
        results.retain(|r| !folded_originals.contains(&r.compound_id));
        for r in results.iter_mut() {
            if let Some(bonus) = absorbed.get(&r.compound_id) {
                r.score += bonus;
            }
        }
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}
