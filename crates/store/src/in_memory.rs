//! In-memory stores, for tests and ephemeral runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rigchat_core::error::StoreError;
use rigchat_core::knowledge::{KnowledgeEntry, KnowledgeStatus};
use rigchat_core::message::Message;
use rigchat_core::session::{Feedback, Session, SessionContext, SessionId, SessionState};
use rigchat_core::store::{KnowledgeQuery, KnowledgeStore, MessageSlice, SessionStore, StatusUpdate};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Sessions and knowledge held in process memory.
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    knowledge: Arc<RwLock<Vec<KnowledgeEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            knowledge: Arc::new(RwLock::new(Vec::new())),
        }
    }

    async fn with_session<F>(&self, id: &SessionId, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                f(session);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased word tokens.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Token-overlap relevance: title hits weigh 3, keyword hits 2, content hits 1.
fn relevance(entry: &KnowledgeEntry, query_tokens: &HashSet<String>) -> f32 {
    let title = tokenize(&entry.title);
    let keywords = tokenize(&entry.keywords.join(" "));
    let content = tokenize(&entry.content);

    query_tokens
        .iter()
        .map(|t| {
            let mut s = 0.0f32;
            if title.contains(t) {
                s += 3.0;
            }
            if keywords.contains(t) {
                s += 2.0;
            }
            if content.contains(t) {
                s += 1.0;
            }
            s
        })
        .sum()
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(format!("session {}", session.session_id)));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn append_message(&self, id: &SessionId, message: &Message) -> Result<bool, StoreError> {
        Ok(self.with_session(id, |s| s.push(message.clone())).await)
    }

    async fn update_state(&self, id: &SessionId, state: &SessionState) -> Result<bool, StoreError> {
        Ok(self
            .with_session(id, |s| {
                s.state = state.clone();
                s.updated_at = Utc::now();
            })
            .await)
    }

    async fn update_context(&self, id: &SessionId, context: &SessionContext) -> Result<bool, StoreError> {
        Ok(self
            .with_session(id, |s| {
                s.context = context.clone();
                s.updated_at = Utc::now();
            })
            .await)
    }

    async fn update_status(&self, id: &SessionId, update: &StatusUpdate) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(s) if s.is_active() => {
                s.status = update.status;
                s.updated_at = update.at;
                s.ended_at = update.ended_at;
                s.duration_ms = update.duration_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_feedback(&self, id: &SessionId, feedback: &Feedback) -> Result<bool, StoreError> {
        Ok(self
            .with_session(id, |s| {
                s.feedback = Some(feedback.clone());
                s.updated_at = Utc::now();
            })
            .await)
    }

    async fn messages(
        &self,
        id: &SessionId,
        offset: usize,
        limit: usize,
    ) -> Result<Option<MessageSlice>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id).map(|s| MessageSlice {
            messages: s.messages.iter().skip(offset).take(limit).cloned().collect(),
            total: s.messages.len(),
        }))
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, mut entry: KnowledgeEntry) -> Result<String, StoreError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        let mut entries = self.knowledge.write().await;
        if entries.iter().any(|e| e.id == id) {
            return Err(StoreError::Conflict(format!("knowledge entry {id}")));
        }
        entries.push(entry);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeEntry>, StoreError> {
        Ok(self.knowledge.read().await.iter().find(|e| e.id == id).cloned())
    }

    async fn search(&self, query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let query_tokens = tokenize(&query.text);
        if query_tokens.is_empty() {
            return Ok(vec![]);
        }

        let entries = self.knowledge.read().await;
        let mut results: Vec<KnowledgeEntry> = entries
            .iter()
            .filter(|e| e.status == KnowledgeStatus::Active)
            .filter(|e| query.category.is_none_or(|c| e.category == c))
            .filter_map(|e| {
                let score = relevance(e, &query_tokens);
                (score > 0.0).then(|| {
                    let mut e = e.clone();
                    e.score = score;
                    e
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.limit);
        Ok(results)
    }

    async fn embedded(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        Ok(self
            .knowledge
            .read()
            .await
            .iter()
            .filter(|e| e.status == KnowledgeStatus::Active && e.embedding.is_some())
            .cloned()
            .collect())
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut entries = self.knowledge.write().await;
        match entries.iter_mut().find(|e| e.id == id) {
            Some(e) => {
                e.usage.access_count += 1;
                e.usage.last_accessed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, id: &str, status: KnowledgeStatus) -> Result<bool, StoreError> {
        let mut entries = self.knowledge.write().await;
        match entries.iter_mut().find(|e| e.id == id) {
            Some(e) => {
                e.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.knowledge.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigchat_core::knowledge::KnowledgeCategory;
    use rigchat_core::session::SessionStatus;

    fn sid(s: &str) -> SessionId {
        SessionId(s.into())
    }

    #[tokio::test]
    async fn insert_find_and_conflict() {
        let store = InMemoryStore::new();
        let session = Session::new(sid("a"), Some("u1".into()));
        SessionStore::insert(&store, &session).await.unwrap();

        let found = store.find(&sid("a")).await.unwrap().unwrap();
        assert_eq!(found.user_id.as_deref(), Some("u1"));

        let err = SessionStore::insert(&store, &session).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn append_keeps_order_and_paginates() {
        let store = InMemoryStore::new();
        SessionStore::insert(&store, &Session::new(sid("a"), None)).await.unwrap();
        for i in 0..5 {
            assert!(store.append_message(&sid("a"), &Message::user(format!("m{i}"))).await.unwrap());
        }

        let slice = store.messages(&sid("a"), 2, 2).await.unwrap().unwrap();
        assert_eq!(slice.total, 5);
        let contents: Vec<_> = slice.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);

        assert!(store.messages(&sid("missing"), 0, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn updates_on_missing_session_return_false() {
        let store = InMemoryStore::new();
        assert!(!store.append_message(&sid("x"), &Message::user("hi")).await.unwrap());
        assert!(!store.update_state(&sid("x"), &SessionState::default()).await.unwrap());
        let update = StatusUpdate {
            status: SessionStatus::Ended,
            at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration_ms: Some(1),
        };
        assert!(!store.update_status(&sid("x"), &update).await.unwrap());
    }

    #[tokio::test]
    async fn only_active_sessions_change_status() {
        let store = InMemoryStore::new();
        SessionStore::insert(&store, &Session::new(sid("a"), None)).await.unwrap();

        let escalate = StatusUpdate {
            status: SessionStatus::Escalated,
            at: Utc::now(),
            ended_at: None,
            duration_ms: None,
        };
        let end = StatusUpdate {
            status: SessionStatus::Ended,
            at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration_ms: Some(5),
        };
        assert!(store.update_status(&sid("a"), &escalate).await.unwrap());
        assert!(!store.update_status(&sid("a"), &end).await.unwrap());

        let stored = store.find(&sid("a")).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Escalated);
        assert!(stored.ended_at.is_none());
    }

    #[tokio::test]
    async fn search_filters_category_and_status() {
        let store = InMemoryStore::new();
        let guide = KnowledgeEntry::new(
            "Build PC gaming 20 triệu",
            "Cấu hình gợi ý với RTX 4060",
            KnowledgeCategory::BuildGuide,
        )
        .with_keywords(&["gaming", "build"]);
        let product = KnowledgeEntry::new("RTX 4060", "Card đồ họa gaming", KnowledgeCategory::Product);
        let archived = KnowledgeEntry {
            status: KnowledgeStatus::Archived,
            ..KnowledgeEntry::new("Gaming cũ", "gaming", KnowledgeCategory::BuildGuide)
        };
        KnowledgeStore::insert(&store, guide).await.unwrap();
        KnowledgeStore::insert(&store, product).await.unwrap();
        KnowledgeStore::insert(&store, archived).await.unwrap();

        let results = store
            .search(&KnowledgeQuery {
                text: "gaming".into(),
                category: Some(KnowledgeCategory::BuildGuide),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Build PC gaming 20 triệu");
        assert!(results[0].score > 0.0);

        let all = store
            .search(&KnowledgeQuery { text: "gaming".into(), category: None, limit: 10 })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn record_access_increments() {
        let store = InMemoryStore::new();
        let id = KnowledgeStore::insert(
            &store,
            KnowledgeEntry::new("PSU", "Nguồn 650W", KnowledgeCategory::Compatibility),
        )
        .await
        .unwrap();

        let at = Utc::now();
        assert!(store.record_access(&id, at).await.unwrap());
        assert!(store.record_access(&id, at).await.unwrap());
        let entry = KnowledgeStore::get(&store, &id).await.unwrap().unwrap();
        assert_eq!(entry.usage.access_count, 2);
        assert_eq!(entry.usage.last_accessed_at, Some(at));
        assert!(!store.record_access("nope", at).await.unwrap());
    }
}
