//! Storage implementations for RigChat: durable session/knowledge stores
//! and the ephemeral cache tier.

pub mod cache;
pub mod in_memory;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cache::InMemoryCache;
pub use in_memory::InMemoryStore;
pub use vector::{cosine_similarity, merge_results, vector_search};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
