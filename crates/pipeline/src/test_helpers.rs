//! Shared test doubles for pipeline tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rigchat_core::cache::Cache;
use rigchat_core::error::{CacheError, ProviderError, StoreError};
use rigchat_core::knowledge::{KnowledgeEntry, KnowledgeStatus};
use rigchat_core::message::{Message, TokenUsage};
use rigchat_core::provider::{
    ChunkReceiver, EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    StreamChunk,
};
use rigchat_core::session::{Feedback, Session, SessionContext, SessionId, SessionState};
use rigchat_core::store::{KnowledgeQuery, KnowledgeStore, MessageSlice, SessionStore, StatusUpdate};

/// A provider with a fixed reply that records every request it sees.
pub struct ScriptedProvider {
    reply: Result<String, ProviderError>,
    embedding: Option<Vec<f32>>,
    delay: Option<Duration>,
    stall: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            embedding: None,
            delay: None,
            stall: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status_code: u16) -> Self {
        Self {
            reply: Err(ProviderError::ApiError {
                status_code,
                message: "upstream unavailable".into(),
            }),
            ..Self::replying("")
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Streams never finish: fragments are sent, then the sender waits
    /// for the receiver to go away.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn usage() -> TokenUsage {
        TokenUsage {
            prompt: 40,
            completion: 12,
            total: 52,
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = self.reply.clone()?;
        Ok(ProviderResponse {
            content,
            usage: Some(Self::usage()),
            model,
            finish_reason: Some("stop".into()),
        })
    }

    /// Streams the reply word by word, then a final usage chunk.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let content = self.reply.clone()?;
        let stall = self.stall;
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tokio::spawn(async move {
            let words: Vec<String> = content.split_inclusive(' ').map(String::from).collect();
            for word in words {
                let chunk = StreamChunk {
                    content: Some(word),
                    ..StreamChunk::default()
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if stall {
                tx.closed().await;
                return;
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: Some(ScriptedProvider::usage()),
                    finish_reason: Some("stop".into()),
                }))
                .await;
        });
        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let embedding = self
            .embedding
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("no embedding scripted".into()))?;
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| embedding.clone()).collect(),
            model: request.model,
        })
    }
}

/// A cache whose every call fails.
pub struct FailingCache;

#[async_trait]
impl Cache for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn list_push(&self, _key: &str, _value: String) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn list_trim(&self, _key: &str, _start: usize, _stop: usize) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn list_range(&self, _key: &str, _start: usize, _stop: usize) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

fn down() -> StoreError {
    StoreError::Storage("database is locked".into())
}

/// A knowledge store whose every call fails.
pub struct FailingKnowledgeStore;

#[async_trait]
impl KnowledgeStore for FailingKnowledgeStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn insert(&self, _entry: KnowledgeEntry) -> Result<String, StoreError> {
        Err(down())
    }

    async fn get(&self, _id: &str) -> Result<Option<KnowledgeEntry>, StoreError> {
        Err(down())
    }

    async fn search(&self, _query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>, StoreError> {
        Err(down())
    }

    async fn embedded(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        Err(down())
    }

    async fn record_access(&self, _id: &str, _at: DateTime<Utc>) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn set_status(&self, _id: &str, _status: KnowledgeStatus) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Err(down())
    }
}

/// A session store whose every call fails.
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn insert(&self, _session: &Session) -> Result<(), StoreError> {
        Err(down())
    }

    async fn find(&self, _id: &SessionId) -> Result<Option<Session>, StoreError> {
        Err(down())
    }

    async fn append_message(&self, _id: &SessionId, _message: &Message) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn update_state(&self, _id: &SessionId, _state: &SessionState) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn update_context(&self, _id: &SessionId, _context: &SessionContext) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn update_status(&self, _id: &SessionId, _update: &StatusUpdate) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn set_feedback(&self, _id: &SessionId, _feedback: &Feedback) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn messages(
        &self,
        _id: &SessionId,
        _offset: usize,
        _limit: usize,
    ) -> Result<Option<MessageSlice>, StoreError> {
        Err(down())
    }
}
