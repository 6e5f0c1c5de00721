//! Durable store traits: the source of truth for sessions and knowledge.
//!
//! Methods that address a record by key return `Ok(false)` / `Ok(None)` when
//! the record does not exist; translating that into a not-found error is the
//! caller's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::error::StoreError;
use crate::knowledge::{KnowledgeCategory, KnowledgeEntry, KnowledgeStatus};
use crate::message::Message;
use crate::session::{Feedback, Session, SessionContext, SessionId, SessionState, SessionStatus};

/// A slice of a session's message history plus the total message count.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSlice {
    pub messages: Vec<Message>,
    pub total: usize,
}

/// Status change written by the session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SessionStatus,
    pub at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Session documents keyed by unique `session_id`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Insert a new session. Fails with `StoreError::Conflict` if the id exists.
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Load a session with its full message history.
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Append one message at the end of the history.
    async fn append_message(&self, id: &SessionId, message: &Message) -> Result<bool, StoreError>;

    async fn update_state(&self, id: &SessionId, state: &SessionState) -> Result<bool, StoreError>;

    async fn update_context(&self, id: &SessionId, context: &SessionContext) -> Result<bool, StoreError>;

    /// Move an `active` session to `update.status`. Returns `Ok(false)` when
    /// no active session exists under `id`, including one already closed.
    async fn update_status(&self, id: &SessionId, update: &StatusUpdate) -> Result<bool, StoreError>;

    async fn set_feedback(&self, id: &SessionId, feedback: &Feedback) -> Result<bool, StoreError>;

    /// Messages in insertion order, skipping `offset`, at most `limit`.
    async fn messages(
        &self,
        id: &SessionId,
        offset: usize,
        limit: usize,
    ) -> Result<Option<MessageSlice>, StoreError>;
}

/// A lexical knowledge query.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeQuery {
    /// Free text to rank against title, content and keywords.
    pub text: String,
    /// Restrict to one category; `None` searches all.
    pub category: Option<KnowledgeCategory>,
    /// Maximum number of results
    pub limit: usize,
}

/// Knowledge documents keyed by store-assigned id.
///
/// Searches only ever return `status = active` entries.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store a new entry, assigning an id when it has none. Returns the id.
    async fn insert(&self, entry: KnowledgeEntry) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<KnowledgeEntry>, StoreError>;

    /// Text-relevance search, best first, `score` set on each result.
    async fn search(&self, query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// All active entries that carry an embedding.
    async fn embedded(&self) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Increment `access_count` and stamp `last_accessed_at`.
    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn set_status(&self, id: &str, status: KnowledgeStatus) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}
