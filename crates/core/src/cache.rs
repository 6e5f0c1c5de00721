//! Cache trait: the fast, ephemeral tier in front of the session store.
//!
//! Modeled on a Redis-style key/value server: string values with TTL plus
//! capped lists. The cache is an accelerator only; every caller must have a
//! store-only path for when it is absent or failing.

use async_trait::async_trait;
use std::time::Duration;
use crate::error::CacheError;
use crate::session::SessionId;

#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a string value with a time-to-live.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Reset the TTL of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Push to the head of a list, creating it if needed. Returns the new length.
    async fn list_push(&self, key: &str, value: String) -> Result<usize, CacheError>;

    /// Keep only elements `start..=stop` (0 = head).
    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<(), CacheError>;

    /// Elements `start..=stop`, head first.
    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, CacheError>;
}

/// Cache key namespaces for one session.
pub mod keys {
    use super::SessionId;

    pub fn session(id: &SessionId) -> String {
        format!("session:{id}")
    }

    pub fn history(id: &SessionId) -> String {
        format!("history:{id}")
    }
}
