//! Anchor — a local-first personal knowledge engine.
//!
//! Heterogeneous text goes in; a bounded, high-signal context window comes
//! out. Documents are decomposed into compounds, molecules, and atoms,
//! deduplicated through a vector drift gate, indexed in an embedded store,
//! and retrieved by a two-phase radial search with an elastic context
//! radius.
//!
//! This umbrella crate wires the member crates together: [`Runtime`] owns
//! the store handle, the vector index, the embedder, the configuration, and
//! the resource monitor, and is passed explicitly wherever it is needed —
//! there are no global singletons. Collaborators (the HTTP surface, the file
//! watcher) consume the [`Runtime::ingest`], [`Runtime::search`], and
//! [`Runtime::ingest_queue`] contracts.
//!
//! ## Quick start
//!
//! ```no_run
//! use anchor::{AnchorConfig, Runtime};
//! use atomize::Provenance;
//!
//! # fn main() -> Result<(), anchor::AnchorError> {
//! let runtime = Runtime::open("/var/lib/anchor", AnchorConfig::default())?;
//! runtime.ingest(
//!     b"Met Lena at the harbor yesterday.",
//!     "journal/2025-06-01.md",
//!     Provenance::Internal,
//!     vec!["journal".into()],
//!     vec![],
//! )?;
//! let response = runtime.search(anchor::SearchRequest {
//!     query: "harbor".into(),
//!     ..Default::default()
//! })?;
//! println!("{}", response.context);
//! # Ok(())
//! # }
//! ```

mod config;
mod resource;
mod runtime;

pub use config::{
    AnchorConfig, BucketsSection, ConfigError, IngestSection, ResourceSection, SearchSection,
    ServerSection, VectorSection,
};
pub use resource::{ResourceConfig, ResourceMonitor};
pub use runtime::Runtime;

pub use atomize::{Atom, Compound, Molecule, MoleculeKind, Provenance, Tag};
pub use embed::{EmbedConfig, Embedder, HashEmbedder};
pub use fingerprint::{distance, simhash, FingerprintConfig};
pub use ingest::{IngestQueue, IngestReport, IngestRequest, IngestStatus, IngestWorker};
pub use search::{SearchRequest, SearchResponse, SearchResult};
pub use store::Store;
pub use vector::VectorIndex;

use thiserror::Error;

/// Top-level error for runtime construction and the public API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AnchorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("data directory error: {0}")]
    Io(String),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Ingest(#[from] ingest::IngestError),
    #[error(transparent)]
    Search(#[from] search::SearchError),
    #[error(transparent)]
    Vector(#[from] vector::VectorError),
    #[error(transparent)]
    Embed(#[from] embed::EmbedError),
}
