//! Inbound operations: the surface a router or CLI drives.
//!
//! Checks caller preconditions (id shape, non-empty message, feedback
//! fields), then delegates to the orchestrator and session manager.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rigchat_config::AppConfig;
use rigchat_core::cache::Cache;
use rigchat_core::error::{Error, Result};
use rigchat_core::intent::{Entities, Intent};
use rigchat_core::message::TokenUsage;
use rigchat_core::provider::Provider;
use rigchat_core::session::{Feedback, Session, SessionId, SessionStatus};
use rigchat_core::store::{KnowledgeStore, SessionStore};
use rigchat_providers::CompletionClient;
use rigchat_security::{AuditLogger, ModerationGate, TracingSink};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{Orchestrator, TurnOutcome, TurnStream};
use crate::retriever::KnowledgeRetriever;
use crate::session::{HistoryPage, SessionManager};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    pub confidence: f32,
    pub sources: Vec<String>,
    pub tokens: TokenUsage,
    pub model: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub reply: String,
    pub session_id: SessionId,
    pub intent: Intent,
    pub entities: Entities,
    pub metadata: ReplyMetadata,
}

impl From<TurnOutcome> for SendMessageResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            reply: outcome.reply,
            session_id: outcome.session_id,
            intent: outcome.intent.intent,
            entities: outcome.entities,
            metadata: ReplyMetadata {
                confidence: outcome.intent.confidence,
                sources: outcome.sources,
                tokens: outcome.tokens,
                model: outcome.model,
                response_time_ms: outcome.response_time_ms,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl SessionEnded {
    fn from_session(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            status: session.status,
            ended_at: session.ended_at,
            duration_ms: session.duration_ms,
        }
    }
}

/// Feedback as submitted by the user, before stamping.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedbackInput {
    pub rating: Option<u8>,
    pub helpful: Option<bool>,
    pub resolved: Option<bool>,
    pub comments: Option<String>,
}

pub struct ChatService {
    orchestrator: Arc<Orchestrator>,
}

impl ChatService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Wire the full pipeline from configuration and already-built backends.
    pub fn build(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        sessions: Arc<dyn SessionStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        cache: Option<Arc<dyn Cache>>,
    ) -> Self {
        let client = Arc::new(CompletionClient::from_config(provider, config));

        let mut manager = SessionManager::from_config(sessions, &config.session);
        if let Some(cache) = cache {
            manager = manager.with_cache(cache);
        }

        let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));
        let moderation = ModerationGate::from_config(&config.moderation).with_audit(audit);

        let mut retriever = KnowledgeRetriever::from_config(knowledge, &config.retrieval);
        if config.retrieval.semantic_search {
            retriever = retriever.with_semantic(client.clone());
        }

        let orchestrator = Orchestrator::new(Arc::new(manager), Arc::new(moderation), retriever, client)
            .configured(config);
        Self::new(Arc::new(orchestrator))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn sessions(&self) -> &SessionManager {
        self.orchestrator.sessions()
    }

    pub async fn create_session(&self, user_id: Option<String>) -> Result<SessionCreated> {
        let session = self.sessions().create(user_id).await?;
        Ok(SessionCreated {
            session_id: session.session_id,
            user_id: session.user_id,
            created_at: session.created_at,
        })
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        user_id: Option<String>,
    ) -> Result<SendMessageResponse> {
        let id = SessionId::parse(session_id)?;
        require_text(message)?;
        let outcome = self.orchestrator.handle(&id, message, user_id).await?;
        Ok(outcome.into())
    }

    /// Like [`send_message`](Self::send_message), streaming the reply.
    pub async fn stream_message(
        &self,
        session_id: &str,
        message: &str,
        user_id: Option<String>,
    ) -> Result<TurnStream> {
        let id = SessionId::parse(session_id)?;
        require_text(message)?;
        self.orchestrator.handle_streaming(&id, message, user_id).await
    }

    pub async fn get_history(&self, session_id: &str, page: usize, limit: usize) -> Result<HistoryPage> {
        let id = SessionId::parse(session_id)?;
        self.sessions().history(&id, page, limit).await
    }

    /// Close a session. Waits for a turn in flight on it to finish.
    pub async fn end_session(&self, session_id: &str) -> Result<SessionEnded> {
        let id = SessionId::parse(session_id)?;
        let session = self.sessions().end(&id).await?;
        Ok(SessionEnded::from_session(session))
    }

    /// Hand a session over to a human agent. It stops accepting messages.
    pub async fn escalate_session(&self, session_id: &str) -> Result<SessionEnded> {
        let id = SessionId::parse(session_id)?;
        let session = self.sessions().escalate(&id).await?;
        Ok(SessionEnded::from_session(session))
    }

    pub async fn submit_feedback(&self, session_id: &str, input: FeedbackInput) -> Result<Feedback> {
        let id = SessionId::parse(session_id)?;
        let feedback = Feedback {
            rating: input.rating,
            helpful: input.helpful,
            resolved: input.resolved,
            comments: input.comments.filter(|c| !c.trim().is_empty()),
            submitted_at: None,
        };
        self.sessions().submit_feedback(&id, feedback).await
    }
}

fn require_text(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(Error::Validation("message must not be empty".into()));
    }
    Ok(())
}
