//! Error types produced by the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting a document.
///
/// Transaction failures always surface — no partial writes — with the source
/// path preserved inside [`store::StoreError::Transaction`] for retry.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum IngestError {
    #[error("content is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("content is empty after canonicalization")]
    EmptyContent,
    #[error(transparent)]
    Atomize(#[from] atomize::AtomizeError),
    #[error(transparent)]
    Embed(#[from] embed::EmbedError),
    #[error(transparent)]
    Vector(#[from] vector::VectorError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("ingestion is shutting down")]
    ShuttingDown,
}
