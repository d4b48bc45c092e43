//! Request, plan, and response types for the search layer.

use std::time::Instant;

use atomize::Provenance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::CensusFilters;
use thiserror::Error;

/// Errors surfaced before any context could be assembled. Later failures are
/// absorbed into `metadata.partial` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SearchError {
    #[error("query is empty after stopword removal")]
    EmptyQuery,
    #[error("requested byte budget {requested} exceeds the limit {limit}")]
    BudgetTooLarge { requested: usize, limit: usize },
}

/// A search request as the API collaborator hands it over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Byte budget for the packed context; defaults from config.
    pub max_chars: Option<usize>,
    /// Restrict to these buckets; empty means all.
    pub buckets: Vec<String>,
    /// Explicit tags folded into the direct term set.
    pub tags: Vec<String>,
    /// Explicit provenance filter. `None` applies the default policy:
    /// internal, external, and variant — quarantine only on request.
    pub provenance: Option<Vec<Provenance>>,
    pub code_weight: Option<f32>,
    /// Per-query deadline in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Keep superseded variants in the packed output instead of folding.
    pub include_variants: bool,
}

/// Execution plan produced by the planner.
#[derive(Debug, Clone)]
pub struct Plan {
    pub query: String,
    pub direct_terms: Vec<String>,
    pub related_terms: Vec<String>,
    pub temporal_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub code_weight: f32,
    pub max_chars: usize,
    pub deadline: Option<Instant>,
}

/// Census and policy context derived from the request.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    pub filters: CensusFilters,
    /// Provenance the caller explicitly asked for (drives boosts).
    pub explicit_provenance: Option<Vec<Provenance>>,
    pub include_variants: bool,
}

impl SearchContext {
    /// Build the census context from a request, applying the default
    /// provenance policy when none is given.
    pub fn from_request(request: &SearchRequest) -> Self {
        let filters = CensusFilters {
            buckets: if request.buckets.is_empty() {
                None
            } else {
                Some(request.buckets.iter().cloned().collect())
            },
            provenance: Some(request.provenance.clone().unwrap_or_else(|| {
                vec![Provenance::Internal, Provenance::External, Provenance::Variant]
            })),
        };
        Self {
            filters,
            explicit_provenance: request.provenance.clone(),
            include_variants: request.include_variants,
        }
    }
}

/// One packed context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub compound_id: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: String,
    pub tags: Vec<String>,
    pub provenance: Provenance,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub score: f32,
    /// How many census hits landed in this window.
    pub hits: u32,
}

/// Phase reached by the query state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    Parsed,
    CensusDone,
    Inflated,
    Scored,
    Packed,
    Returned,
}

/// Diagnostic metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub partial: bool,
    pub total_hits: usize,
    pub radius: usize,
    pub phase: QueryPhase,
    pub elapsed_micros: u64,
    pub error: Option<String>,
}

/// A well-formed response — returned even when empty, so downstream prompt
/// assembly never sees null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub context: String,
    pub results: Vec<SearchResult>,
    pub strategy: String,
    pub metadata: SearchMetadata,
}

impl SearchResponse {
    pub fn empty(strategy: &str, phase: QueryPhase, error: Option<String>) -> Self {
        Self {
            context: String::new(),
            results: Vec::new(),
            strategy: strategy.to_string(),
            metadata: SearchMetadata {
                partial: false,
                total_hits: 0,
                radius: 0,
                phase,
                elapsed_micros: 0,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_excludes_quarantine() {
        let ctx = SearchContext::from_request(&SearchRequest {
            query: "anything".into(),
            ..Default::default()
        });
        let allowed = ctx.filters.provenance.unwrap();
        assert!(allowed.contains(&Provenance::Internal));
        assert!(allowed.contains(&Provenance::Variant));
        assert!(!allowed.contains(&Provenance::Quarantine));
        assert!(ctx.explicit_provenance.is_none());
    }

    #[test]
    fn explicit_provenance_is_honored() {
        let ctx = SearchContext::from_request(&SearchRequest {
            query: "anything".into(),
            provenance: Some(vec![Provenance::Quarantine]),
            ..Default::default()
        });
        assert_eq!(
            ctx.filters.provenance.unwrap(),
            vec![Provenance::Quarantine]
        );
        assert!(ctx.explicit_provenance.is_some());
    }

    #[test]
    fn bucket_filter_carries_over() {
        let ctx = SearchContext::from_request(&SearchRequest {
            query: "anything".into(),
            buckets: vec!["personal".into()],
            ..Default::default()
        });
        assert!(ctx.filters.buckets.unwrap().contains("personal"));
    }

    #[test]
    fn empty_response_is_well_formed() {
        let r = SearchResponse::empty("empty", QueryPhase::Parsed, None);
        assert_eq!(r.context, "");
        assert!(r.results.is_empty());
        assert_eq!(r.strategy, "empty");
    }
}
