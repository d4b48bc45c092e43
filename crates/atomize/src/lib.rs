//! Content decomposition for Anchor.
//!
//! A source document enters as raw text and leaves as a [`Compound`] (the
//! canonicalized body plus identity and provenance), ordered [`Molecule`]s
//! (byte-ranged spans classified as prose, code, or data), and [`Atom`]s
//! (entity mentions that feed the tag graph). All offsets produced here are
//! UTF-8 **byte** positions into the canonicalized body — never code-point
//! indices — so slices taken downstream always land on character boundaries.
//!
//! The decomposition order is fixed: line endings are canonicalized, the
//! [`sanitize`] pass strips serialized wrappers, and only then are spans cut
//! with a running byte cursor over the final body.

mod atomizer;
mod entities;
mod error;
mod sanitize;
mod tags;
mod types;

pub use atomizer::{atomize, atomize_segment, canonical_body, AtomizeConfig, Atomized};
pub use entities::{extract_entities, Entity, EntityKind};
pub use error::AtomizeError;
pub use sanitize::sanitize;
pub use tags::{derive_tags, looks_like_code};
pub use types::{
    atom_id, compound_id, entity_hash16, molecule_id, Atom, AtomPosition, ByteRange, Compound,
    Molecule, MoleculeKind, Provenance, Tag, TagEdge, VariantEdge, MAX_TAG_BYTES,
};
