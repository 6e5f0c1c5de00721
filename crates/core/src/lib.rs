//! # RigChat Core
//!
//! Domain types, traits, and error definitions for the RigChat
//! conversational pipeline. This crate has **zero framework dependencies**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion provider, durable store, cache)
//! is defined as a trait here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod intent;
pub mod session;
pub mod knowledge;
pub mod provider;
pub mod store;
pub mod cache;

// Re-export key types at crate root for ergonomics
pub use error::{CacheError, Error, ErrorKind, ProviderError, Result, StoreError};
pub use message::{Message, MessageMetadata, Role, TokenUsage};
pub use intent::{Budget, Currency, Entities, Intent, IntentResult};
pub use session::{
    ExperienceLevel, Feedback, Purpose, Session, SessionContext, SessionId, SessionState,
    SessionStatus, UserProfile,
};
pub use knowledge::{KnowledgeCategory, KnowledgeEntry, KnowledgeStatus, KnowledgeUsage};
pub use provider::{PromptMessage, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use store::{KnowledgeQuery, KnowledgeStore, MessageSlice, SessionStore, StatusUpdate};
pub use cache::Cache;
