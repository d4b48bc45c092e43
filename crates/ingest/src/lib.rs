//! The Anchor ingestion pipeline.
//!
//! This is where content enters the system. Raw bytes are validated,
//! decomposed into molecules, embedded, pushed through the drift gate, and
//! committed — compound, molecules, atoms, positions, and edges — in one
//! store transaction per unit of work. Documents over the size gate take the
//! streaming path: the canonical body is sliced into overlapping windows that
//! are processed serially in file order, so molecule sequence numbers (and
//! therefore ids) stay deterministic.
//!
//! Backpressure for the file-watcher collaborator comes from
//! [`IngestQueue`], a bounded channel whose producer blocks when the worker
//! falls behind.

mod chunker;
mod config;
mod error;
mod pipeline;
mod queue;

pub use chunker::{windows, ChunkPlan};
pub use config::IngestConfig;
pub use error::IngestError;
pub use pipeline::{IngestPipeline, IngestReport, IngestRequest, IngestStatus};
pub use queue::{spawn_queue, IngestQueue, IngestWorker};
