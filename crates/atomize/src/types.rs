//! Core data model: compounds, molecules, atoms, and the edge/index rows
//! derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::AtomizeError;

/// Tags and atom labels longer than this are not semantic; writers skip them.
pub const MAX_TAG_BYTES: usize = 255;

/// Trust/origin label of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Internal,
    External,
    Quarantine,
    Variant,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Internal => "internal",
            Provenance::External => "external",
            Provenance::Quarantine => "quarantine",
            Provenance::Variant => "variant",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open `[start, end)` byte interval into a compound body.
///
/// Construction validates ordering; [`ByteRange::checked`] additionally
/// verifies both endpoints land on UTF-8 character boundaries of a concrete
/// body. Store APIs accept only this type, never loose `(usize, usize)`
/// pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Result<Self, AtomizeError> {
        if start >= end {
            return Err(AtomizeError::InvalidRange {
                start,
                end,
                len: end,
            });
        }
        Ok(Self { start, end })
    }

    /// Validate the range against `body`: in bounds and on char boundaries.
    pub fn checked(body: &str, start: usize, end: usize) -> Result<Self, AtomizeError> {
        if start >= end || end > body.len() {
            return Err(AtomizeError::InvalidRange {
                start,
                end,
                len: body.len(),
            });
        }
        if !body.is_char_boundary(start) {
            return Err(AtomizeError::NotCharBoundary { offset: start });
        }
        if !body.is_char_boundary(end) {
            return Err(AtomizeError::NotCharBoundary { offset: end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Closed set of semantic category tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Relationship,
    Narrative,
    Technical,
    Industry,
    Location,
    Emotional,
    Temporal,
    Causal,
    Code,
    Data,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Relationship => "relationship",
            Tag::Narrative => "narrative",
            Tag::Technical => "technical",
            Tag::Industry => "industry",
            Tag::Location => "location",
            Tag::Emotional => "emotional",
            Tag::Temporal => "temporal",
            Tag::Causal => "causal",
            Tag::Code => "code",
            Tag::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Tag> {
        Some(match s {
            "relationship" => Tag::Relationship,
            "narrative" => Tag::Narrative,
            "technical" => Tag::Technical,
            "industry" => Tag::Industry,
            "location" => Tag::Location,
            "emotional" => Tag::Emotional,
            "temporal" => Tag::Temporal,
            "causal" => Tag::Causal,
            "code" => Tag::Code,
            "data" => Tag::Data,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source document: canonicalized body plus identity and provenance.
///
/// The body is immutable once written; re-ingesting changed content produces
/// a new compound under a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    /// Hex SHA-256 of `source + "\0" + body`.
    pub id: String,
    /// Canonicalized UTF-8 body. All molecule offsets index into this.
    pub body: String,
    /// Source path or logical origin supplied at ingest.
    pub source: String,
    pub ingested_at: DateTime<Utc>,
    pub provenance: Provenance,
    /// 64-bit simhash of the body, for fuzzy document similarity.
    pub signature: u64,
    /// User-supplied grouping labels.
    pub buckets: Vec<String>,
}

/// Molecule classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoleculeKind {
    Prose,
    Code,
    Data,
}

impl MoleculeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoleculeKind::Prose => "prose",
            MoleculeKind::Code => "code",
            MoleculeKind::Data => "data",
        }
    }
}

/// A semantically coherent span of a compound.
///
/// `range` satisfies `body[range.start..range.end] == content` exactly: the
/// atomizer trims surrounding whitespace by narrowing the range, not by
/// rewriting the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    /// Deterministic in `(compound_id, sequence)`.
    pub id: String,
    pub compound_id: String,
    pub sequence: u32,
    pub range: ByteRange,
    pub kind: MoleculeKind,
    pub content: String,
    /// First numeric capture for data molecules.
    pub numeric_value: Option<f64>,
    pub numeric_unit: Option<String>,
    /// Derived semantic categories, deduplicated, at most 8.
    pub tags: Vec<Tag>,
    /// Fixed-dimension embedding; empty until the pipeline fills it in.
    pub embedding: Vec<f32>,
    /// Assigned by the drift gate; `None` for variants and failed embeds.
    pub vector_id: Option<u64>,
}

/// An entity mention inside a molecule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// `atom_{molecule_id}_{entity_hash16}`.
    pub id: String,
    pub molecule_id: String,
    /// Lowercased, at most [`MAX_TAG_BYTES`] bytes.
    pub label: String,
    pub tags: Vec<Tag>,
}

/// Denormalized census row: where does `term` occur?
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomPosition {
    pub term: String,
    pub compound_id: String,
    pub byte_offset: u64,
}

/// Bipartite edge between an atom and a tag within a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagEdge {
    pub atom_id: String,
    /// Derived category or explicit user tag.
    pub tag: String,
    pub bucket: String,
}

/// `is_variant_of` edge emitted by the drift gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEdge {
    pub source_id: String,
    pub target_id: String,
    /// `1 − nearest-neighbor distance` at gate time.
    pub weight: f64,
}

/// Stable compound id: hex SHA-256 over the source path and body.
pub fn compound_id(source: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic molecule id in `(compound_id, sequence)`.
pub fn molecule_id(compound_id: &str, sequence: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(compound_id.as_bytes());
    hasher.update(sequence.to_be_bytes());
    let digest = hasher.finalize();
    format!("mol_{}", hex::encode(&digest[..8]))
}

/// 16-hex-digit hash of a normalized entity label.
pub fn entity_hash16(label: &str) -> String {
    format!("{:016x}", xxh3_64(label.as_bytes()))
}

/// Atom id: `atom_{molecule_id}_{entity_hash16}`.
pub fn atom_id(molecule_id: &str, label: &str) -> String {
    format!("atom_{}_{}", molecule_id, entity_hash16(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== ByteRange ====================

    #[test]
    fn byte_range_rejects_inverted() {
        assert!(ByteRange::new(5, 5).is_err());
        assert!(ByteRange::new(6, 5).is_err());
        assert!(ByteRange::new(0, 1).is_ok());
    }

    #[test]
    fn byte_range_checked_rejects_mid_char() {
        let body = "a🌍b";
        // 🌍 occupies bytes 1..5
        assert!(ByteRange::checked(body, 0, 2).is_err());
        assert!(ByteRange::checked(body, 2, 5).is_err());
        assert!(ByteRange::checked(body, 1, 5).is_ok());
        assert!(ByteRange::checked(body, 0, body.len()).is_ok());
    }

    #[test]
    fn byte_range_checked_rejects_out_of_bounds() {
        assert!(ByteRange::checked("abc", 0, 4).is_err());
    }

    #[test]
    fn byte_range_overlap() {
        let a = ByteRange::new(0, 10).unwrap();
        let b = ByteRange::new(10, 20).unwrap();
        let c = ByteRange::new(5, 15).unwrap();
        assert!(!a.overlaps(&b), "abutting ranges do not overlap");
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    // ==================== Identifiers ====================

    #[test]
    fn compound_id_is_stable_and_input_sensitive() {
        let a = compound_id("notes/a.md", "body");
        assert_eq!(a, compound_id("notes/a.md", "body"));
        assert_ne!(a, compound_id("notes/b.md", "body"));
        assert_ne!(a, compound_id("notes/a.md", "other"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn path_body_separator_prevents_ambiguity() {
        assert_ne!(compound_id("ab", "c"), compound_id("a", "bc"));
    }

    #[test]
    fn molecule_id_deterministic_in_compound_and_sequence() {
        let c = compound_id("p", "b");
        assert_eq!(molecule_id(&c, 0), molecule_id(&c, 0));
        assert_ne!(molecule_id(&c, 0), molecule_id(&c, 1));
        assert!(molecule_id(&c, 0).starts_with("mol_"));
    }

    #[test]
    fn atom_id_embeds_molecule_and_label_hash() {
        let id = atom_id("mol_0011223344556677", "rust");
        assert!(id.starts_with("atom_mol_0011223344556677_"));
        assert_eq!(id, atom_id("mol_0011223344556677", "rust"));
        assert_ne!(id, atom_id("mol_0011223344556677", "go"));
    }

    #[test]
    fn entity_hash16_width() {
        assert_eq!(entity_hash16("anything").len(), 16);
    }

    // ==================== Enums ====================

    #[test]
    fn tag_parse_roundtrip() {
        for tag in [
            Tag::Relationship,
            Tag::Narrative,
            Tag::Technical,
            Tag::Industry,
            Tag::Location,
            Tag::Emotional,
            Tag::Temporal,
            Tag::Causal,
            Tag::Code,
            Tag::Data,
        ] {
            assert_eq!(Tag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(Tag::parse("not-a-tag"), None);
    }

    #[test]
    fn provenance_display() {
        assert_eq!(Provenance::Quarantine.to_string(), "quarantine");
        assert_eq!(Provenance::Variant.as_str(), "variant");
    }
}
