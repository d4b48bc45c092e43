//! The storage seam the executor reads through.
//!
//! Abstracting the store behind a trait keeps the executor's partial-failure
//! behavior testable: a wrapper that fails a fraction of reads exercises the
//! same code path a disk hiccup would.

use atomize::{ByteRange, Molecule};
use store::{CensusFilters, CompoundMeta, Snapshot, Store, StoreError};

/// Read-side contract the search executor requires.
pub trait ContextSource {
    /// Census: where does `term` occur? Capped, filtered.
    fn census(
        &self,
        term: &str,
        filters: &CensusFilters,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError>;

    /// UTF-8-safe slice of a compound body.
    fn read_slice(&self, compound_id: &str, range: ByteRange) -> Result<String, StoreError>;

    fn compound_meta(&self, compound_id: &str) -> Result<Option<CompoundMeta>, StoreError>;

    fn molecules_for(&self, compound_id: &str) -> Result<Vec<Molecule>, StoreError>;

    fn molecule(&self, molecule_id: &str) -> Result<Option<Molecule>, StoreError>;

    fn variant_target(&self, molecule_id: &str) -> Result<Option<(String, f64)>, StoreError>;

    fn vector_molecule(&self, vector_id: u64) -> Result<Option<String>, StoreError>;
}

impl ContextSource for Snapshot {
    fn census(
        &self,
        term: &str,
        filters: &CensusFilters,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.atom_positions(term, filters, cap)
    }

    fn read_slice(&self, compound_id: &str, range: ByteRange) -> Result<String, StoreError> {
        Snapshot::read_slice(self, compound_id, range)
    }

    fn compound_meta(&self, compound_id: &str) -> Result<Option<CompoundMeta>, StoreError> {
        Snapshot::compound_meta(self, compound_id)
    }

    fn molecules_for(&self, compound_id: &str) -> Result<Vec<Molecule>, StoreError> {
        Snapshot::molecules_for(self, compound_id)
    }

    fn molecule(&self, molecule_id: &str) -> Result<Option<Molecule>, StoreError> {
        Snapshot::molecule(self, molecule_id)
    }

    fn variant_target(&self, molecule_id: &str) -> Result<Option<(String, f64)>, StoreError> {
        Snapshot::variant_target(self, molecule_id)
    }

    fn vector_molecule(&self, vector_id: u64) -> Result<Option<String>, StoreError> {
        Snapshot::vector_molecule(self, vector_id)
    }
}

// Convenience impl for tests and one-shot callers; each call opens a fresh
// snapshot, so cross-call consistency is not guaranteed. Queries should
// prefer a single `Snapshot`.
impl ContextSource for Store {
    fn census(
        &self,
        term: &str,
        filters: &CensusFilters,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.atom_positions(term, filters, cap)
    }

    fn read_slice(&self, compound_id: &str, range: ByteRange) -> Result<String, StoreError> {
        Store::read_slice(self, compound_id, range)
    }

    fn compound_meta(&self, compound_id: &str) -> Result<Option<CompoundMeta>, StoreError> {
        Store::compound_meta(self, compound_id)
    }

    fn molecules_for(&self, compound_id: &str) -> Result<Vec<Molecule>, StoreError> {
        Store::molecules_for(self, compound_id)
    }

    fn molecule(&self, molecule_id: &str) -> Result<Option<Molecule>, StoreError> {
        Store::molecule(self, molecule_id)
    }

    fn variant_target(&self, molecule_id: &str) -> Result<Option<(String, f64)>, StoreError> {
        Store::variant_target(self, molecule_id)
    }

    fn vector_molecule(&self, vector_id: u64) -> Result<Option<String>, StoreError> {
        Store::vector_molecule(self, vector_id)
    }
}
