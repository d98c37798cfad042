//! Retrieval over the local guidance index and the remote domain index,
//! merged into one ranked answer.

pub mod context;
pub mod merge;
pub mod retriever;

pub use context::format_context;
pub use merge::merge_results;
pub use retriever::{DualRetriever, Retrieval, SourceStatus};
