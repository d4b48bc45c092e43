//! Universal Semantic Search for Anchor.
//!
//! Retrieval runs in two phases. The planner turns a natural-language query
//! into weighted terms with a 70/30 budget split between direct and related
//! terms. The executor then runs the radial pipeline: census the atom
//! positions for each term, derive an elastic radius from the byte budget,
//! inflate UTF-8-safe context windows around each hit, score and fold them,
//! and pack the winners into a bounded context string.
//!
//! The executor talks to storage through the [`ContextSource`] trait, so the
//! partial-failure contract (a flaky read never kills a query, it just flags
//! `metadata.partial`) is testable without a real store.

mod config;
mod executor;
mod planner;
mod source;
mod types;

pub use config::SearchConfig;
pub use executor::SearchExecutor;
pub use planner::plan;
pub use source::ContextSource;
pub use types::{
    Plan, QueryPhase, SearchContext, SearchError, SearchMetadata, SearchRequest, SearchResponse,
    SearchResult,
};
