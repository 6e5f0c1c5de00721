//! Session manager: cache-aside over the durable session store.
//!
//! The store is the source of truth. The cache holds, per session, the full
//! session blob and a capped list of recent messages (newest at the head),
//! both under one TTL that every access refreshes.
//!
//! Writes go to the store first; the cache is patched afterwards. Any cache
//! failure is logged and ignored, so a missing or broken cache only costs
//! latency.
//!
//! Turns and status changes on one session exclude each other through
//! [`SessionManager::lock`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rigchat_config::SessionConfig;
use rigchat_core::cache::{keys, Cache};
use rigchat_core::error::{Error, Result, StoreError};
use rigchat_core::message::Message;
use rigchat_core::session::{Feedback, Session, SessionContext, SessionId, SessionState, SessionStatus};
use rigchat_core::store::{SessionStore, StatusUpdate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::locks::{SessionGuard, SessionLocks};

/// Pagination block of a history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

/// One page of a session's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

pub const MAX_PAGE_LIMIT: usize = 100;

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: Option<Arc<dyn Cache>>,
    ttl: Duration,
    history_cap: usize,
    locks: SessionLocks,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            cache: None,
            ttl: Duration::from_secs(3600),
            history_cap: 50,
            locks: SessionLocks::new(),
        }
    }

    pub fn from_config(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self::new(store)
            .with_ttl(config.cache_ttl())
            .with_history_cap(config.history_cache_size)
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap.max(1);
        self
    }

    /// Wait for exclusive access to one session. Held by a turn from
    /// resolution through persistence, and by `end` / `escalate`.
    pub async fn lock(&self, id: &SessionId) -> SessionGuard {
        self.locks.acquire(id).await
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Create a session under a fresh id.
    pub async fn create(&self, user_id: Option<String>) -> Result<Session> {
        self.create_with_id(SessionId::new(), user_id).await
    }

    /// Create a session under a caller-chosen id. Fails with
    /// `StoreError::Conflict` if the id is taken.
    pub async fn create_with_id(&self, id: SessionId, user_id: Option<String>) -> Result<Session> {
        let session = Session::new(id, user_id);
        self.store.insert(&session).await?;
        info!(session_id = %session.session_id, "Session created");
        self.populate(&session).await;
        Ok(session)
    }

    /// Load a session, cache first. A cache hit refreshes the TTL.
    pub async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        if let Some(session) = self.cached_session(id).await {
            self.refresh(id).await;
            return Ok(Some(session));
        }

        let found = self.store.find(id).await?;
        if let Some(session) = &found {
            debug!(session_id = %id, "Session cache miss, loaded from store");
            self.populate(session).await;
        }
        Ok(found)
    }

    /// Load a session or fail with not-found.
    pub async fn require(&self, id: &SessionId) -> Result<Session> {
        self.get(id).await?.ok_or_else(|| Error::session_not_found(id.as_str()))
    }

    /// Mark a session ended, stamping end time and duration.
    pub async fn end(&self, id: &SessionId) -> Result<Session> {
        self.close(id, SessionStatus::Ended).await
    }

    /// Hand a session over to a human. The session stops accepting messages.
    pub async fn escalate(&self, id: &SessionId) -> Result<Session> {
        self.close(id, SessionStatus::Escalated).await
    }

    /// Waits for an in-flight turn on `id` to finish first.
    async fn close(&self, id: &SessionId, status: SessionStatus) -> Result<Session> {
        let _guard = self.lock(id).await;
        let mut session = self.require(id).await?;
        let now = Utc::now();
        session.transition(status, now)?;

        let update = StatusUpdate {
            status,
            at: now,
            ended_at: session.ended_at,
            duration_ms: session.duration_ms,
        };
        if !self.store.update_status(id, &update).await? {
            // Closed elsewhere since the (possibly cached) read
            self.evict(id).await;
            return Err(match self.store.find(id).await? {
                Some(current) => Error::SessionClosed {
                    session_id: id.to_string(),
                    status: current.status,
                },
                None => Error::session_not_found(id.as_str()),
            });
        }
        self.evict(id).await;

        info!(session_id = %id, status = %status, duration_ms = ?session.duration_ms, "Session closed");
        Ok(session)
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Append one message to the durable history, then to the cached copies.
    pub async fn append_message(&self, id: &SessionId, message: &Message) -> Result<()> {
        self.expect_found(id, self.store.append_message(id, message).await)?;

        let Some(cache) = &self.cache else {
            return Ok(());
        };
        self.patch_blob(id, |s| s.push(message.clone())).await;

        let key = keys::history(id);
        let pushed = async {
            let json = serde_json::to_string(message).map_err(|e| e.to_string())?;
            cache.list_push(&key, json).await.map_err(|e| e.to_string())?;
            cache
                .list_trim(&key, 0, self.history_cap - 1)
                .await
                .map_err(|e| e.to_string())
        }
        .await;
        if let Err(e) = pushed {
            warn!(session_id = %id, "Failed to cache message: {e}");
        }
        self.refresh(id).await;
        Ok(())
    }

    pub async fn update_state(&self, id: &SessionId, state: &SessionState) -> Result<()> {
        self.expect_found(id, self.store.update_state(id, state).await)?;
        self.patch_blob(id, |s| {
            s.state = state.clone();
            s.updated_at = Utc::now();
        })
        .await;
        Ok(())
    }

    pub async fn update_context(&self, id: &SessionId, context: &SessionContext) -> Result<()> {
        self.expect_found(id, self.store.update_context(id, context).await)?;
        self.patch_blob(id, |s| {
            s.context = context.clone();
            s.updated_at = Utc::now();
        })
        .await;
        Ok(())
    }

    /// Validate and attach end-of-conversation feedback. Allowed in any status.
    pub async fn submit_feedback(&self, id: &SessionId, feedback: Feedback) -> Result<Feedback> {
        feedback.validate()?;
        let feedback = Feedback {
            submitted_at: Some(Utc::now()),
            ..feedback
        };
        self.expect_found(id, self.store.set_feedback(id, &feedback).await)?;
        self.patch_blob(id, |s| s.feedback = Some(feedback.clone())).await;
        info!(session_id = %id, rating = ?feedback.rating, "Feedback recorded");
        Ok(feedback)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The `n` most recent messages, oldest first.
    ///
    /// Served from the cached list unless it is empty, or shorter than `n`
    /// while full to the cap (the store may then hold older messages).
    pub async fn recent_history(&self, id: &SessionId, n: usize) -> Result<Vec<Message>> {
        if n == 0 {
            return Ok(vec![]);
        }
        if let Some(cache) = &self.cache {
            match cache.list_range(&keys::history(id), 0, n - 1).await {
                Ok(items)
                    if !items.is_empty() && (items.len() >= n || items.len() < self.history_cap) =>
                {
                    let parsed: std::result::Result<Vec<Message>, _> =
                        items.iter().rev().map(|j| serde_json::from_str(j)).collect();
                    match parsed {
                        Ok(messages) => return Ok(messages),
                        Err(e) => warn!(session_id = %id, "Discarding unreadable cached history: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(session_id = %id, "History cache read failed: {e}"),
            }
        }

        let total = self
            .store
            .messages(id, 0, 0)
            .await?
            .ok_or_else(|| Error::session_not_found(id.as_str()))?
            .total;
        let slice = self
            .store
            .messages(id, total.saturating_sub(n), n)
            .await?
            .ok_or_else(|| Error::session_not_found(id.as_str()))?;
        Ok(slice.messages)
    }

    /// A page of history, oldest first. `page` is 1-based; `limit` is
    /// clamped to `1..=100`.
    pub async fn history(&self, id: &SessionId, page: usize, limit: usize) -> Result<HistoryPage> {
        if page == 0 {
            return Err(Error::Validation("page must be at least 1".into()));
        }
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = (page - 1).saturating_mul(limit);

        let slice = self
            .store
            .messages(id, offset, limit)
            .await?
            .ok_or_else(|| Error::session_not_found(id.as_str()))?;

        let total_pages = slice.total.div_ceil(limit);
        Ok(HistoryPage {
            messages: slice.messages,
            pagination: Pagination {
                page,
                limit,
                total: slice.total,
                total_pages,
                has_more: page < total_pages,
            },
        })
    }

    // ── Cache plumbing ────────────────────────────────────────────────────

    /// Reset the TTL on every cached key of a session. Never fails.
    pub async fn refresh(&self, id: &SessionId) {
        let Some(cache) = &self.cache else { return };
        for key in [keys::session(id), keys::history(id)] {
            if let Err(e) = cache.expire(&key, self.ttl).await {
                warn!(key = %key, "Failed to refresh cache TTL: {e}");
                return;
            }
        }
    }

    async fn evict(&self, id: &SessionId) {
        let Some(cache) = &self.cache else { return };
        for key in [keys::session(id), keys::history(id)] {
            if let Err(e) = cache.delete(&key).await {
                warn!(key = %key, "Failed to evict cache entry: {e}");
            }
        }
    }

    async fn cached_session(&self, id: &SessionId) -> Option<Session> {
        let cache = self.cache.as_ref()?;
        match cache.get(&keys::session(id)).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(session_id = %id, "Discarding unreadable cached session: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(session_id = %id, "Session cache read failed: {e}");
                None
            }
        }
    }

    async fn cache_set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(cache) = &self.cache else { return };
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, "Failed to serialize cache entry: {e}");
                return;
            }
        };
        if let Err(e) = cache.set_ex(key, json, self.ttl).await {
            warn!(key = %key, "Cache write failed: {e}");
        }
    }

    /// Write a freshly loaded session into both cache entries.
    async fn populate(&self, session: &Session) {
        let Some(cache) = &self.cache else { return };
        let id = &session.session_id;
        self.cache_set(&keys::session(id), session).await;

        let key = keys::history(id);
        let recent = session.messages.len().saturating_sub(self.history_cap);
        let filled = async {
            cache.delete(&key).await.map_err(|e| e.to_string())?;
            for message in &session.messages[recent..] {
                let json = serde_json::to_string(message).map_err(|e| e.to_string())?;
                cache.list_push(&key, json).await.map_err(|e| e.to_string())?;
            }
            cache.expire(&key, self.ttl).await.map_err(|e| e.to_string())
        }
        .await;
        if let Err(e) = filled {
            warn!(session_id = %id, "Failed to cache history: {e}");
        }
    }

    /// Apply `f` to the cached session blob, if there is one.
    async fn patch_blob<F>(&self, id: &SessionId, f: F)
    where
        F: FnOnce(&mut Session),
    {
        if let Some(mut session) = self.cached_session(id).await {
            f(&mut session);
            self.cache_set(&keys::session(id), &session).await;
        }
    }

    fn expect_found(&self, id: &SessionId, result: std::result::Result<bool, StoreError>) -> Result<()> {
        if result? {
            Ok(())
        } else {
            Err(Error::session_not_found(id.as_str()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingCache, FailingSessionStore};
    use rigchat_core::error::ErrorKind;
    use rigchat_core::session::Purpose;
    use rigchat_store::{InMemoryCache, InMemoryStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let manager = SessionManager::new(store.clone())
            .with_cache(cache.clone())
            .with_history_cap(3);
        Fixture { store, cache, manager }
    }

    #[tokio::test]
    async fn create_writes_store_and_cache() {
        let f = fixture();
        let session = f.manager.create(Some("u1".into())).await.unwrap();

        assert!(f.store.find(&session.session_id).await.unwrap().is_some());
        let cached = f.cache.get(&keys::session(&session.session_id)).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn get_falls_back_to_store_and_repopulates() {
        let f = fixture();
        let id = SessionId("s1".into());
        SessionStore::insert(f.store.as_ref(), &Session::new(id.clone(), None)).await.unwrap();
        f.store.append_message(&id, &Message::user("đã lưu")).await.unwrap();

        let session = f.manager.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 1);
        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_some());
        let history = f.cache.list_range(&keys::history(&id), 0, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let f = fixture();
        assert!(f.manager.get(&SessionId("nope".into())).await.unwrap().is_none());
        let err = f.manager.require(&SessionId("nope".into())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn append_is_durable_and_cached_list_is_capped() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;
        for i in 0..5 {
            f.manager.append_message(&id, &Message::user(format!("m{i}"))).await.unwrap();
        }

        let stored = f.store.find(&id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 5);

        let cached = f.cache.list_range(&keys::history(&id), 0, 10).await.unwrap();
        assert_eq!(cached.len(), 3);

        let recent = f.manager.recent_history(&id, 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        // Cached blob sees the appends too
        let blob = f.manager.get(&id).await.unwrap().unwrap();
        assert_eq!(blob.messages.len(), 5);
    }

    #[tokio::test]
    async fn append_to_unknown_session_is_not_found() {
        let f = fixture();
        let err = f
            .manager
            .append_message(&SessionId("ghost".into()), &Message::user("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn context_update_reaches_cache() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;
        let context = SessionContext {
            purpose: Purpose::BuildHelp,
            ..SessionContext::default()
        };
        f.manager.update_context(&id, &context).await.unwrap();

        let json = f.cache.get(&keys::session(&id)).await.unwrap().unwrap();
        let cached: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(cached.context, context);
        assert_eq!(f.store.find(&id).await.unwrap().unwrap().context, context);
    }

    #[tokio::test]
    async fn short_cache_cap_falls_back_to_store() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;
        for i in 0..8 {
            f.manager.append_message(&id, &Message::user(format!("m{i}"))).await.unwrap();
        }

        // Cap is 3, so the list alone cannot answer a request for 6
        let recent = f.manager.recent_history(&id, 6).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4", "m5", "m6", "m7"]);

        // A history shorter than the cap is complete in the cache
        let young = f.manager.create(None).await.unwrap().session_id;
        f.manager.append_message(&young, &Message::user("một")).await.unwrap();
        f.manager.append_message(&young, &Message::user("hai")).await.unwrap();
        assert_eq!(f.manager.recent_history(&young, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_closes_apply_one_status() {
        let f = fixture();
        let manager = Arc::new(f.manager);
        let id = manager.create(None).await.unwrap().session_id;

        let (ended, escalated) = tokio::join!(manager.end(&id), manager.escalate(&id));
        assert_ne!(ended.is_ok(), escalated.is_ok());

        let stored = f.store.find(&id).await.unwrap().unwrap();
        let winner = if ended.is_ok() { SessionStatus::Ended } else { SessionStatus::Escalated };
        assert_eq!(stored.status, winner);

        let loser = ended.err().or(escalated.err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn stale_cached_status_cannot_reopen_a_transition() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;

        // Another instance ended the session; our cache still says active
        let now = Utc::now();
        let update = StatusUpdate {
            status: SessionStatus::Ended,
            at: now,
            ended_at: Some(now),
            duration_ms: Some(1),
        };
        assert!(f.store.update_status(&id, &update).await.unwrap());

        let err = f.manager.escalate(&id).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed { status: SessionStatus::Ended, .. }));
        assert_eq!(f.store.find(&id).await.unwrap().unwrap().status, SessionStatus::Ended);
        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn end_waits_for_the_session_lock() {
        let f = fixture();
        let manager = Arc::new(f.manager);
        let id = manager.create(None).await.unwrap().session_id;

        let guard = manager.lock(&id).await;
        let closing = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.end(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!closing.is_finished());
        assert_eq!(f.store.find(&id).await.unwrap().unwrap().status, SessionStatus::Active);

        drop(guard);
        let ended = closing.await.unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn append_refreshes_every_key() {
        let f = fixture();
        let manager = SessionManager::new(f.store.clone())
            .with_cache(f.cache.clone())
            .with_ttl(Duration::from_secs(60));
        let id = manager.create(None).await.unwrap().session_id;

        tokio::time::advance(Duration::from_secs(50)).await;
        manager.append_message(&id, &Message::user("vẫn còn")).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        // 100s after creation, both keys live on the refreshed TTL
        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_some());
        assert_eq!(f.cache.list_range(&keys::history(&id), 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn end_stamps_duration_and_evicts() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;

        let ended = f.manager.end(&id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert!(ended.duration_ms.is_some_and(|d| d >= 0));

        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_none());
        let stored = f.store.find(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);

        // Already closed
        let err = f.manager.end(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn escalate_closes_without_end_stamp() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;
        let escalated = f.manager.escalate(&id).await.unwrap();
        assert_eq!(escalated.status, SessionStatus::Escalated);
        assert!(escalated.ended_at.is_none());
    }

    #[tokio::test]
    async fn feedback_is_validated_and_stamped() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;

        let bad = Feedback {
            rating: Some(9),
            ..Feedback::default()
        };
        assert!(f.manager.submit_feedback(&id, bad).await.is_err());

        let good = Feedback {
            rating: Some(5),
            resolved: Some(true),
            ..Feedback::default()
        };
        let saved = f.manager.submit_feedback(&id, good).await.unwrap();
        assert!(saved.submitted_at.is_some());
        let stored = f.store.find(&id).await.unwrap().unwrap();
        assert_eq!(stored.feedback.and_then(|fb| fb.rating), Some(5));
    }

    #[tokio::test]
    async fn history_paginates() {
        let f = fixture();
        let id = f.manager.create(None).await.unwrap().session_id;
        for i in 0..25 {
            f.manager.append_message(&id, &Message::user(format!("m{i}"))).await.unwrap();
        }

        let page = f.manager.history(&id, 2, 10).await.unwrap();
        assert_eq!(page.messages.len(), 10);
        assert_eq!(page.messages[0].content, "m10");
        assert_eq!(
            page.pagination,
            Pagination { page: 2, limit: 10, total: 25, total_pages: 3, has_more: true }
        );

        let last = f.manager.history(&id, 3, 10).await.unwrap();
        assert_eq!(last.messages.len(), 5);
        assert!(!last.pagination.has_more);

        let beyond = f.manager.history(&id, 9, 10).await.unwrap();
        assert!(beyond.messages.is_empty());

        let clamped = f.manager.history(&id, 1, 1000).await.unwrap();
        assert_eq!(clamped.pagination.limit, MAX_PAGE_LIMIT);

        assert!(f.manager.history(&id, 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn broken_cache_falls_back_to_store() {
        let store = Arc::new(InMemoryStore::new());
        let manager = SessionManager::new(store.clone()).with_cache(Arc::new(FailingCache));

        let id = manager.create(None).await.unwrap().session_id;
        manager.append_message(&id, &Message::user("xin chào")).await.unwrap();
        manager.append_message(&id, &Message::assistant("chào bạn")).await.unwrap();

        let session = manager.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        let recent = manager.recent_history(&id, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "xin chào");
        assert!(manager.end(&id).await.is_ok());
    }

    #[tokio::test]
    async fn store_failure_is_a_database_error() {
        let manager = SessionManager::new(Arc::new(FailingSessionStore));
        let err = manager.create(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_entries_expire_after_ttl() {
        let f = fixture();
        let manager = SessionManager::new(f.store.clone())
            .with_cache(f.cache.clone())
            .with_ttl(Duration::from_secs(60));
        let id = manager.create(None).await.unwrap().session_id;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_none());

        // Store still has it, and a read re-populates
        assert!(manager.get(&id).await.unwrap().is_some());
        assert!(f.cache.get(&keys::session(&id)).await.unwrap().is_some());
    }
}
