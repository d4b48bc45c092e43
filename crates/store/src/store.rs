//! Store implementation over redb.
//!
//! Table layout: string-keyed tables hold bincode-encoded rows; the census
//! and tag indexes are multimaps so conflict-ignore upserts come for free
//! (re-inserting an existing pair is a no-op).

use std::collections::HashMap;
use std::path::Path;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use redb::{
    Database, MultimapTableDefinition, ReadTransaction, ReadableDatabase, ReadableMultimapTable,
    ReadableTable, TableDefinition, WriteTransaction,
};
use tracing::{debug, warn};

use atomize::{
    Atom, AtomPosition, ByteRange, Compound, Molecule, TagEdge, VariantEdge, MAX_TAG_BYTES,
};

use crate::{CensusFilters, CompoundMeta, StoreError, MAX_ROWS_PER_CHUNK};

const COMPOUND_META: TableDefinition<&str, &[u8]> = TableDefinition::new("compound_meta");
const COMPOUND_BODIES: TableDefinition<&str, &[u8]> = TableDefinition::new("compound_bodies");
const MOLECULES: TableDefinition<&str, &[u8]> = TableDefinition::new("molecules");
const MOLECULES_BY_COMPOUND: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("molecules_by_compound");
const ATOMS: TableDefinition<&str, &[u8]> = TableDefinition::new("atoms");
const ATOM_POSITIONS: MultimapTableDefinition<&str, (&str, u64)> =
    MultimapTableDefinition::new("atom_positions");
const TAG_EDGES: MultimapTableDefinition<&str, (&str, &str)> =
    MultimapTableDefinition::new("tag_edges");
const VARIANT_EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("variant_edges");
const VECTOR_IDS: TableDefinition<u64, &str> = TableDefinition::new("vector_ids");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const VECTOR_SEQ_KEY: &str = "vector_seq";

/// Handle to the on-disk store. Cheap to share behind an `Arc`; redb handles
/// its own locking and MVCC underneath.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open or create the store at `path`, materializing every table inside
    /// one initial write transaction.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;
        let txn = db.begin_write().map_err(StoreError::backend)?;
        {
            txn.open_table(COMPOUND_META).map_err(StoreError::backend)?;
            txn.open_table(COMPOUND_BODIES)
                .map_err(StoreError::backend)?;
            txn.open_table(MOLECULES).map_err(StoreError::backend)?;
            txn.open_multimap_table(MOLECULES_BY_COMPOUND)
                .map_err(StoreError::backend)?;
            txn.open_table(ATOMS).map_err(StoreError::backend)?;
            txn.open_multimap_table(ATOM_POSITIONS)
                .map_err(StoreError::backend)?;
            txn.open_multimap_table(TAG_EDGES)
                .map_err(StoreError::backend)?;
            txn.open_table(VARIANT_EDGES).map_err(StoreError::backend)?;
            txn.open_table(VECTOR_IDS).map_err(StoreError::backend)?;
            txn.open_table(META).map_err(StoreError::backend)?;
        }
        txn.commit().map_err(StoreError::backend)?;
        Ok(Self { db })
    }

    /// Begin a write batch for one compound's ingest. Dropping the batch
    /// without committing rolls everything back.
    pub fn begin(&self, source: &str) -> Result<WriteBatch, StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Transaction {
            path: source.to_string(),
            cause: e.to_string(),
        })?;
        Ok(WriteBatch {
            txn,
            source: source.to_string(),
            warnings: Vec::new(),
        })
    }

    /// Pin a consistent read view. Writes committed after this point are not
    /// visible through the snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let txn = self.db.begin_read().map_err(StoreError::backend)?;
        Ok(Snapshot { txn })
    }

    pub fn compound_meta(&self, id: &str) -> Result<Option<CompoundMeta>, StoreError> {
        self.snapshot()?.compound_meta(id)
    }

    pub fn compound_body(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.snapshot()?.compound_body(id)
    }

    pub fn read_slice(&self, id: &str, range: ByteRange) -> Result<String, StoreError> {
        self.snapshot()?.read_slice(id, range)
    }

    pub fn molecule(&self, id: &str) -> Result<Option<Molecule>, StoreError> {
        self.snapshot()?.molecule(id)
    }

    pub fn molecules_for(&self, compound_id: &str) -> Result<Vec<Molecule>, StoreError> {
        self.snapshot()?.molecules_for(compound_id)
    }

    pub fn atom_positions(
        &self,
        term: &str,
        filters: &CensusFilters,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.snapshot()?.atom_positions(term, filters, cap)
    }

    pub fn variant_target(&self, source_id: &str) -> Result<Option<(String, f64)>, StoreError> {
        self.snapshot()?.variant_target(source_id)
    }

    pub fn tag_edges(&self, tag: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.snapshot()?.tag_edges(tag)
    }

    pub fn vector_molecule(&self, vector_id: u64) -> Result<Option<String>, StoreError> {
        self.snapshot()?.vector_molecule(vector_id)
    }

    /// Feed for the startup rebuild: every stored molecule that was assigned
    /// a vector id, with its embedding.
    pub fn molecules_with_vectors(&self) -> Result<Vec<(u64, String, Vec<f32>)>, StoreError> {
        self.snapshot()?.molecules_with_vectors()
    }

    pub fn count_compounds(&self) -> Result<u64, StoreError> {
        self.snapshot()?.count_compounds()
    }
}

/// One consistent read view of the store.
pub struct Snapshot {
    txn: ReadTransaction,
}

impl Snapshot {
    pub fn compound_meta(&self, id: &str) -> Result<Option<CompoundMeta>, StoreError> {
        let table = self
            .txn
            .open_table(COMPOUND_META)
            .map_err(StoreError::backend)?;
        match table.get(id).map_err(StoreError::backend)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn compound_body(&self, id: &str) -> Result<Option<String>, StoreError> {
        let table = self
            .txn
            .open_table(COMPOUND_BODIES)
            .map_err(StoreError::backend)?;
        match table.get(id).map_err(StoreError::backend)? {
            Some(guard) => {
                let body = std::str::from_utf8(guard.value())
                    .map_err(StoreError::corrupt)?
                    .to_string();
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    /// Read a UTF-8-safe slice of a compound body.
    ///
    /// The requested range is clamped to the body and snapped inward to
    /// character boundaries, so a multi-byte sequence is never split.
    pub fn read_slice(&self, id: &str, range: ByteRange) -> Result<String, StoreError> {
        let body = self
            .compound_body(id)?
            .ok_or_else(|| StoreError::NotFound {
                what: "compound",
                id: id.to_string(),
            })?;
        let mut start = range.start.min(body.len());
        let mut end = range.end.min(body.len());
        while start < body.len() && !body.is_char_boundary(start) {
            start += 1;
        }
        while end > start && !body.is_char_boundary(end) {
            end -= 1;
        }
        if start >= end {
            return Ok(String::new());
        }
        Ok(body[start..end].to_string())
    }

    pub fn molecule(&self, id: &str) -> Result<Option<Molecule>, StoreError> {
        let table = self
            .txn
            .open_table(MOLECULES)
            .map_err(StoreError::backend)?;
        match table.get(id).map_err(StoreError::backend)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn molecules_for(&self, compound_id: &str) -> Result<Vec<Molecule>, StoreError> {
        let by_compound = self
            .txn
            .open_multimap_table(MOLECULES_BY_COMPOUND)
            .map_err(StoreError::backend)?;
        let mut ids = Vec::new();
        for entry in by_compound
            .get(compound_id)
            .map_err(StoreError::backend)?
        {
            let guard = entry.map_err(StoreError::backend)?;
            ids.push(guard.value().to_string());
        }
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(m) = self.molecule(&id)? {
                out.push(m);
            }
        }
        out.sort_by_key(|m| m.sequence);
        Ok(out)
    }

    /// The census: every `(compound_id, byte_offset)` where `term` occurs,
    /// filtered by bucket and provenance, capped at `cap` rows.
    pub fn atom_positions(
        &self,
        term: &str,
        filters: &CensusFilters,
        cap: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let positions = self
            .txn
            .open_multimap_table(ATOM_POSITIONS)
            .map_err(StoreError::backend)?;
        let mut meta_cache: HashMap<String, Option<CompoundMeta>> = HashMap::new();
        let mut out = Vec::new();
        for entry in positions.get(term).map_err(StoreError::backend)? {
            if out.len() >= cap {
                break;
            }
            let guard = entry.map_err(StoreError::backend)?;
            let (compound_id, offset) = guard.value();
            let accepted = match meta_cache.get(compound_id) {
                Some(cached) => cached.as_ref().is_some_and(|m| filters.accepts(m)),
                None => {
                    let meta = self.compound_meta(compound_id)?;
                    let accepted = meta.as_ref().is_some_and(|m| filters.accepts(m));
                    meta_cache.insert(compound_id.to_string(), meta);
                    accepted
                }
            };
            if accepted {
                out.push((compound_id.to_string(), offset));
            }
        }
        Ok(out)
    }

    pub fn variant_target(&self, source_id: &str) -> Result<Option<(String, f64)>, StoreError> {
        let table = self
            .txn
            .open_table(VARIANT_EDGES)
            .map_err(StoreError::backend)?;
        match table.get(source_id).map_err(StoreError::backend)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn vector_molecule(&self, vector_id: u64) -> Result<Option<String>, StoreError> {
        let table = self
            .txn
            .open_table(VECTOR_IDS)
            .map_err(StoreError::backend)?;
        match table.get(vector_id).map_err(StoreError::backend)? {
            Some(guard) => Ok(Some(guard.value().to_string())),
            None => Ok(None),
        }
    }

    /// Faceted lookup: every `(atom_id, bucket)` edge carrying `tag`.
    pub fn tag_edges(&self, tag: &str) -> Result<Vec<(String, String)>, StoreError> {
        let table = self
            .txn
            .open_multimap_table(TAG_EDGES)
            .map_err(StoreError::backend)?;
        let mut out = Vec::new();
        for entry in table.get(tag).map_err(StoreError::backend)? {
            let guard = entry.map_err(StoreError::backend)?;
            let (atom_id, bucket) = guard.value();
            out.push((atom_id.to_string(), bucket.to_string()));
        }
        Ok(out)
    }

    pub fn molecules_with_vectors(&self) -> Result<Vec<(u64, String, Vec<f32>)>, StoreError> {
        let table = self
            .txn
            .open_table(MOLECULES)
            .map_err(StoreError::backend)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(StoreError::backend)? {
            let (_, value) = entry.map_err(StoreError::backend)?;
            let molecule: Molecule = decode_row(value.value())?;
            if let Some(vid) = molecule.vector_id {
                out.push((vid, molecule.id, molecule.embedding));
            }
        }
        Ok(out)
    }

    pub fn count_compounds(&self) -> Result<u64, StoreError> {
        let table = self
            .txn
            .open_table(COMPOUND_META)
            .map_err(StoreError::backend)?;
        let mut count = 0u64;
        for entry in table.iter().map_err(StoreError::backend)? {
            entry.map_err(StoreError::backend)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Single-writer transactional bracket for one compound ingest.
///
/// Every operation is upsert-shaped; the batch either commits as a whole or
/// leaves no trace. Oversized tags are skipped with a warning rather than
/// failing the batch — they were not semantic.
pub struct WriteBatch {
    txn: WriteTransaction,
    source: String,
    warnings: Vec<String>,
}

impl WriteBatch {
    fn fail<E: std::fmt::Display>(&self, err: E) -> StoreError {
        StoreError::Transaction {
            path: self.source.clone(),
            cause: err.to_string(),
        }
    }

    pub fn put_compound(&mut self, compound: &Compound) -> Result<(), StoreError> {
        let meta = CompoundMeta {
            id: compound.id.clone(),
            source: compound.source.clone(),
            ingested_at: compound.ingested_at,
            provenance: compound.provenance,
            signature: compound.signature,
            buckets: compound.buckets.clone(),
            body_len: compound.body.len() as u64,
        };
        let encoded_meta = encode_to_vec(&meta, standard()).map_err(|e| self.fail(e))?;
        {
            let mut table = self
                .txn
                .open_table(COMPOUND_META)
                .map_err(|e| self.fail(e))?;
            table
                .insert(compound.id.as_str(), encoded_meta.as_slice())
                .map_err(|e| self.fail(e))?;
        }
        {
            let mut bodies = self
                .txn
                .open_table(COMPOUND_BODIES)
                .map_err(|e| self.fail(e))?;
            bodies
                .insert(compound.id.as_str(), compound.body.as_bytes())
                .map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    pub fn put_molecule_batch(&mut self, molecules: &[Molecule]) -> Result<(), StoreError> {
        for chunk in molecules.chunks(MAX_ROWS_PER_CHUNK) {
            let mut encoded = Vec::with_capacity(chunk.len());
            for molecule in chunk {
                encoded.push((
                    molecule.id.as_str(),
                    molecule.compound_id.as_str(),
                    encode_to_vec(molecule, standard()).map_err(|e| self.fail(e))?,
                ));
            }
            let mut table = self.txn.open_table(MOLECULES).map_err(|e| self.fail(e))?;
            let mut by_compound = self
                .txn
                .open_multimap_table(MOLECULES_BY_COMPOUND)
                .map_err(|e| self.fail(e))?;
            for (id, compound_id, bytes) in &encoded {
                table
                    .insert(*id, bytes.as_slice())
                    .map_err(|e| self.fail(e))?;
                by_compound.insert(*compound_id, *id).map_err(|e| self.fail(e))?;
            }
            debug!(rows = chunk.len(), "molecule_chunk_written");
        }
        Ok(())
    }

    pub fn put_atoms(&mut self, atoms: &[Atom]) -> Result<(), StoreError> {
        for chunk in atoms.chunks(MAX_ROWS_PER_CHUNK) {
            let mut table = self.txn.open_table(ATOMS).map_err(|e| self.fail(e))?;
            for atom in chunk {
                let bytes = encode_to_vec(atom, standard()).map_err(|e| self.fail(e))?;
                table
                    .insert(atom.id.as_str(), bytes.as_slice())
                    .map_err(|e| self.fail(e))?;
            }
        }
        Ok(())
    }

    /// Bulk upsert, conflict-ignore: re-inserting an existing position is a
    /// no-op by multimap semantics.
    pub fn put_atom_positions(&mut self, positions: &[AtomPosition]) -> Result<(), StoreError> {
        for chunk in positions.chunks(MAX_ROWS_PER_CHUNK) {
            let mut table = self
                .txn
                .open_multimap_table(ATOM_POSITIONS)
                .map_err(|e| self.fail(e))?;
            for pos in chunk {
                table
                    .insert(
                        pos.term.as_str(),
                        (pos.compound_id.as_str(), pos.byte_offset),
                    )
                    .map_err(|e| self.fail(e))?;
            }
        }
        Ok(())
    }

    /// Bulk upsert, conflict-ignore. Tags longer than [`MAX_TAG_BYTES`] are
    /// skipped and reported as warnings.
    pub fn put_tag_edges(&mut self, edges: &[TagEdge]) -> Result<(), StoreError> {
        for chunk in edges.chunks(MAX_ROWS_PER_CHUNK) {
            let mut table = self
                .txn
                .open_multimap_table(TAG_EDGES)
                .map_err(|e| self.fail(e))?;
            for edge in chunk {
                if edge.tag.len() > MAX_TAG_BYTES {
                    let head: String = edge.tag.chars().take(24).collect();
                    warn!(tag_bytes = edge.tag.len(), "oversized_tag_skipped");
                    self.warnings
                        .push(format!("tag exceeds {MAX_TAG_BYTES} bytes, skipped: {head}…"));
                    continue;
                }
                table
                    .insert(
                        edge.tag.as_str(),
                        (edge.atom_id.as_str(), edge.bucket.as_str()),
                    )
                    .map_err(|e| self.fail(e))?;
            }
        }
        Ok(())
    }

    pub fn put_variant_edge(&mut self, edge: &VariantEdge) -> Result<(), StoreError> {
        let bytes = encode_to_vec(&(edge.target_id.clone(), edge.weight), standard())
            .map_err(|e| self.fail(e))?;
        let mut table = self
            .txn
            .open_table(VARIANT_EDGES)
            .map_err(|e| self.fail(e))?;
        table
            .insert(edge.source_id.as_str(), bytes.as_slice())
            .map_err(|e| self.fail(e))?;
        Ok(())
    }

    /// Allocate the next id from the monotonic vector-id sequence.
    pub fn next_vector_id(&mut self) -> Result<u64, StoreError> {
        let mut table = self.txn.open_table(META).map_err(|e| self.fail(e))?;
        let next = table
            .get(VECTOR_SEQ_KEY)
            .map_err(|e| self.fail(e))?
            .map(|g| g.value())
            .unwrap_or(0);
        table
            .insert(VECTOR_SEQ_KEY, next + 1)
            .map_err(|e| self.fail(e))?;
        Ok(next)
    }

    pub fn put_vector_mapping(&mut self, vector_id: u64, molecule_id: &str) -> Result<(), StoreError> {
        let mut table = self.txn.open_table(VECTOR_IDS).map_err(|e| self.fail(e))?;
        table
            .insert(vector_id, molecule_id)
            .map_err(|e| self.fail(e))?;
        Ok(())
    }

    /// Warnings accumulated so far (skipped tags and the like).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Commit the batch atomically, returning accumulated warnings.
    pub fn commit(self) -> Result<Vec<String>, StoreError> {
        let WriteBatch {
            txn,
            source,
            warnings,
        } = self;
        txn.commit().map_err(|e| StoreError::Transaction {
            path: source,
            cause: e.to_string(),
        })?;
        Ok(warnings)
    }
}

fn decode_row<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = decode_from_slice(bytes, standard()).map_err(StoreError::corrupt)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomize::{atomize, AtomizeConfig, Provenance};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        Store::open(dir.path().join("anchor.redb")).expect("open store")
    }

    fn sample(raw: &str, source: &str) -> atomize::Atomized {
        atomize(raw, source, Provenance::Internal, &AtomizeConfig::default()).expect("atomize")
    }

    fn write_all(store: &Store, out: &atomize::Atomized) -> Vec<String> {
        let mut batch = store.begin(&out.compound.source).unwrap();
        batch.put_compound(&out.compound).unwrap();
        batch.put_molecule_batch(&out.molecules).unwrap();
        batch.put_atoms(&out.atoms).unwrap();
        batch.commit().unwrap()
    }

    // ==================== Roundtrips ====================

    #[test]
    fn compound_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("A paragraph that is long enough to keep around.", "n/a.md");
        write_all(&store, &out);

        let meta = store.compound_meta(&out.compound.id).unwrap().unwrap();
        assert_eq!(meta.source, "n/a.md");
        assert_eq!(meta.body_len as usize, out.compound.body.len());
        assert_eq!(meta.signature, out.compound.signature);

        let body = store.compound_body(&out.compound.id).unwrap().unwrap();
        assert_eq!(body, out.compound.body);
    }

    #[test]
    fn molecules_roundtrip_in_sequence_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample(
            "First paragraph with enough content.\n\nSecond paragraph with enough content.",
            "m.md",
        );
        write_all(&store, &out);

        let got = store.molecules_for(&out.compound.id).unwrap();
        assert_eq!(got.len(), out.molecules.len());
        for (a, b) in got.iter().zip(&out.molecules) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn missing_rows_read_as_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.compound_meta("nope").unwrap().is_none());
        assert!(store.molecule("nope").unwrap().is_none());
        assert!(store.variant_target("nope").unwrap().is_none());
        assert!(store.vector_molecule(99).unwrap().is_none());
    }

    // ==================== Transaction semantics ====================

    #[test]
    fn dropped_batch_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("Content that will be rolled back entirely.", "rb.md");
        {
            let mut batch = store.begin("rb.md").unwrap();
            batch.put_compound(&out.compound).unwrap();
            batch.put_molecule_batch(&out.molecules).unwrap();
            // no commit
        }
        assert!(store.compound_meta(&out.compound.id).unwrap().is_none());
        assert_eq!(store.count_compounds().unwrap(), 0);
    }

    #[test]
    fn replayed_ingest_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("Identical content written twice over.", "i.md");
        write_all(&store, &out);
        write_all(&store, &out);
        assert_eq!(store.count_compounds().unwrap(), 1);
        let got = store.molecules_for(&out.compound.id).unwrap();
        assert_eq!(got.len(), out.molecules.len());
    }

    #[test]
    fn snapshot_does_not_see_later_commits() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let snap = store.snapshot().unwrap();
        let out = sample("Committed after the snapshot was taken.", "s.md");
        write_all(&store, &out);
        assert!(snap.compound_meta(&out.compound.id).unwrap().is_none());
        assert!(store.compound_meta(&out.compound.id).unwrap().is_some());
    }

    // ==================== Census ====================

    #[test]
    fn atom_positions_filter_by_bucket_and_provenance() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut a = sample("Notes about zeppelin flights over the bay.", "a.md");
        a.compound.buckets = vec!["personal".into()];
        let mut b = sample("Other notes about zeppelin engines here too.", "b.md");
        b.compound.buckets = vec!["code".into()];
        for out in [&a, &b] {
            let mut batch = store.begin(&out.compound.source).unwrap();
            batch.put_compound(&out.compound).unwrap();
            batch
                .put_atom_positions(&[AtomPosition {
                    term: "zeppelin".into(),
                    compound_id: out.compound.id.clone(),
                    byte_offset: 12,
                }])
                .unwrap();
            batch.commit().unwrap();
        }

        let all = store
            .atom_positions("zeppelin", &CensusFilters::default(), 50)
            .unwrap();
        assert_eq!(all.len(), 2);

        let personal_only = store
            .atom_positions(
                "zeppelin",
                &CensusFilters {
                    buckets: Some(["personal".to_string()].into_iter().collect()),
                    provenance: None,
                },
                50,
            )
            .unwrap();
        assert_eq!(personal_only.len(), 1);
        assert_eq!(personal_only[0].0, a.compound.id);

        let internal_only = store
            .atom_positions(
                "zeppelin",
                &CensusFilters {
                    buckets: None,
                    provenance: Some(vec![Provenance::Internal]),
                },
                50,
            )
            .unwrap();
        assert_eq!(internal_only.len(), 2);
    }

    #[test]
    fn duplicate_positions_collapse() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("Duplicate position test content for the index.", "d.md");
        let mut batch = store.begin("d.md").unwrap();
        batch.put_compound(&out.compound).unwrap();
        let pos = AtomPosition {
            term: "duplicate".into(),
            compound_id: out.compound.id.clone(),
            byte_offset: 0,
        };
        batch
            .put_atom_positions(&[pos.clone(), pos.clone(), pos])
            .unwrap();
        batch.commit().unwrap();

        let rows = store
            .atom_positions("duplicate", &CensusFilters::default(), 50)
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn census_respects_cap() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("Capped census content with enough length.", "c.md");
        let mut batch = store.begin("c.md").unwrap();
        batch.put_compound(&out.compound).unwrap();
        let positions: Vec<AtomPosition> = (0..20)
            .map(|i| AtomPosition {
                term: "capped".into(),
                compound_id: out.compound.id.clone(),
                byte_offset: i,
            })
            .collect();
        batch.put_atom_positions(&positions).unwrap();
        batch.commit().unwrap();

        let rows = store
            .atom_positions("capped", &CensusFilters::default(), 5)
            .unwrap();
        assert_eq!(rows.len(), 5);
    }

    // ==================== Slices ====================

    #[test]
    fn read_slice_snaps_to_char_boundaries() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let out = sample("Hello 🌍 World. Test 🚀.", "u.md");
        write_all(&store, &out);

        // Byte 7 is inside the 🌍 sequence (bytes 6..10).
        let slice = store
            .read_slice(&out.compound.id, ByteRange::new(7, 15).unwrap())
            .unwrap();
        assert!(slice.starts_with(' ') || slice.starts_with('W'));
        assert!(std::str::from_utf8(slice.as_bytes()).is_ok());

        let clamped = store
            .read_slice(&out.compound.id, ByteRange::new(0, 10_000).unwrap())
            .unwrap();
        assert_eq!(clamped, out.compound.body);
    }

    #[test]
    fn read_slice_on_missing_compound_errors() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store
            .read_slice("missing", ByteRange::new(0, 10).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    // ==================== Tag edges and vector sequence ====================

    #[test]
    fn oversized_tags_are_skipped_with_warning() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut batch = store.begin("t.md").unwrap();
        let long_tag = "x".repeat(256);
        let ok_tag = "y".repeat(255);
        batch
            .put_tag_edges(&[
                TagEdge {
                    atom_id: "atom_1".into(),
                    tag: long_tag,
                    bucket: "inbox".into(),
                },
                TagEdge {
                    atom_id: "atom_1".into(),
                    tag: ok_tag.clone(),
                    bucket: "inbox".into(),
                },
            ])
            .unwrap();
        assert_eq!(batch.warnings().len(), 1);
        batch.commit().unwrap();

        // The 255-byte tag must be queryable; the 256-byte one must not.
        assert_eq!(store.tag_edges(&ok_tag).unwrap().len(), 1);
        let long_tag = "x".repeat(256);
        assert!(store.tag_edges(&long_tag).unwrap().is_empty());
    }

    #[test]
    fn vector_sequence_is_monotonic_across_batches() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut batch = store.begin("v.md").unwrap();
        assert_eq!(batch.next_vector_id().unwrap(), 0);
        assert_eq!(batch.next_vector_id().unwrap(), 1);
        batch.put_vector_mapping(0, "mol_a").unwrap();
        batch.put_vector_mapping(1, "mol_b").unwrap();
        batch.commit().unwrap();

        let mut batch = store.begin("v2.md").unwrap();
        assert_eq!(batch.next_vector_id().unwrap(), 2);
        batch.commit().unwrap();

        assert_eq!(store.vector_molecule(0).unwrap().as_deref(), Some("mol_a"));
        assert_eq!(store.vector_molecule(1).unwrap().as_deref(), Some("mol_b"));
    }

    #[test]
    fn uncommitted_vector_ids_are_not_burned() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        {
            let mut batch = store.begin("x.md").unwrap();
            assert_eq!(batch.next_vector_id().unwrap(), 0);
            // dropped without commit
        }
        let mut batch = store.begin("y.md").unwrap();
        assert_eq!(batch.next_vector_id().unwrap(), 0);
        batch.commit().unwrap();
    }

    #[test]
    fn variant_edge_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut batch = store.begin("ve.md").unwrap();
        batch
            .put_variant_edge(&VariantEdge {
                source_id: "mol_new".into(),
                target_id: "mol_old".into(),
                weight: 0.97,
            })
            .unwrap();
        batch.commit().unwrap();

        let (target, weight) = store.variant_target("mol_new").unwrap().unwrap();
        assert_eq!(target, "mol_old");
        assert!((weight - 0.97).abs() < 1e-9);
    }

    #[test]
    fn molecules_with_vectors_feed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut out = sample(
            "Vector feed paragraph one, long enough.\n\nVector feed paragraph two, long enough.",
            "vf.md",
        );
        out.molecules[0].vector_id = Some(7);
        out.molecules[0].embedding = vec![0.1, 0.2];
        write_all(&store, &out);

        let feed = store.molecules_with_vectors().unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].0, 7);
        assert_eq!(feed[0].1, out.molecules[0].id);
        assert_eq!(feed[0].2, vec![0.1, 0.2]);
    }
}
