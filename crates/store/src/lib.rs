//! Content-addressed persistence for Anchor.
//!
//! One redb database file holds everything: compound metadata and bodies,
//! molecules, atoms, the atom-position census multimap, the tag bipartite
//! index, variant edges, and the vector-id sequence. Redb gives ACID
//! transactions with MVCC, so a whole ingest commits atomically and readers
//! always observe committed state — a partial compound is never visible.
//!
//! Writes go through [`WriteBatch`] (single writer, commit-or-rollback);
//! reads go through [`Snapshot`], which pins one consistent view for the
//! duration of a query.

mod store;

pub use store::{Snapshot, Store, WriteBatch};

use atomize::Provenance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Rows written per table pass inside a batch. Bounds the transient encode
/// buffers on very large ingests.
pub const MAX_ROWS_PER_CHUNK: usize = 100;

/// Errors surfaced by the store.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum StoreError {
    /// Backend (redb) failure: I/O, lock, or transaction trouble. Transient;
    /// the caller may retry.
    #[error("store backend error: {0}")]
    Backend(String),
    /// Stored bytes failed to decode. Irrecoverable for the affected row.
    #[error("store corruption: {0}")]
    Corrupt(String),
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    /// A batch failed and was rolled back; `source` is the compound path the
    /// caller should retry with.
    #[error("ingest transaction for {path:?} rolled back: {cause}")]
    Transaction { path: String, cause: String },
}

impl StoreError {
    pub(crate) fn backend<E: std::fmt::Display>(err: E) -> Self {
        StoreError::Backend(err.to_string())
    }

    pub(crate) fn corrupt<E: std::fmt::Display>(err: E) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Compound row without the body: everything census filtering and result
/// assembly need, cheap to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundMeta {
    pub id: String,
    pub source: String,
    pub ingested_at: chrono::DateTime<chrono::Utc>,
    pub provenance: Provenance,
    pub signature: u64,
    pub buckets: Vec<String>,
    pub body_len: u64,
}

/// Census-time filters. `None` fields mean "no constraint"; retrieval
/// policy (such as excluding quarantined content by default) belongs to the
/// query layer, not here.
#[derive(Debug, Clone, Default)]
pub struct CensusFilters {
    pub buckets: Option<BTreeSet<String>>,
    pub provenance: Option<Vec<Provenance>>,
}

impl CensusFilters {
    pub fn accepts(&self, meta: &CompoundMeta) -> bool {
        if let Some(wanted) = &self.buckets {
            if !meta.buckets.iter().any(|b| wanted.contains(b)) {
                return false;
            }
        }
        if let Some(wanted) = &self.provenance {
            if !wanted.contains(&meta.provenance) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;
    use chrono::Utc;

    fn meta(buckets: &[&str], provenance: Provenance) -> CompoundMeta {
        CompoundMeta {
            id: "c1".into(),
            source: "a.md".into(),
            ingested_at: Utc::now(),
            provenance,
            signature: 0,
            buckets: buckets.iter().map(|s| s.to_string()).collect(),
            body_len: 10,
        }
    }

    #[test]
    fn empty_filters_accept_everything() {
        let f = CensusFilters::default();
        assert!(f.accepts(&meta(&["inbox"], Provenance::Internal)));
        assert!(f.accepts(&meta(&[], Provenance::Quarantine)));
    }

    #[test]
    fn bucket_filter_requires_intersection() {
        let f = CensusFilters {
            buckets: Some(["personal".to_string()].into_iter().collect()),
            provenance: None,
        };
        assert!(f.accepts(&meta(&["personal", "misc"], Provenance::Internal)));
        assert!(!f.accepts(&meta(&["code"], Provenance::Internal)));
        assert!(!f.accepts(&meta(&[], Provenance::Internal)));
    }

    #[test]
    fn provenance_filter_matches_exactly() {
        let f = CensusFilters {
            buckets: None,
            provenance: Some(vec![Provenance::Internal, Provenance::External]),
        };
        assert!(f.accepts(&meta(&[], Provenance::Internal)));
        assert!(!f.accepts(&meta(&[], Provenance::Quarantine)));
    }
}
