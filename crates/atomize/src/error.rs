//! Error types produced by the `atomize` crate.

use thiserror::Error;

/// Errors that can occur while decomposing a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AtomizeError {
    #[error("byte range [{start}, {end}) is invalid for body of {len} bytes")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("offset {offset} does not fall on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },
    #[error("body is empty after sanitization")]
    EmptyBody,
}
