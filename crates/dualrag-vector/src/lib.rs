//! In-memory vector index, generation management, document feeds and the
//! refresh scheduler that keeps an index populated.

pub mod feed;
pub mod index;
pub mod manager;
pub mod refresh;

pub use feed::{EventRecord, HttpFeed, JsonFileFeed, StaticFeed, TextDirFeed};
pub use index::{cosine_similarity, VectorIndex};
pub use manager::IndexManager;
pub use refresh::{RefreshScheduler, RefreshSchedulerBuilder};
