//! The per-turn state machine.
//!
//! ```text
//! Idle → SessionResolved → Moderated → Classified → KnowledgeGathered
//!      → PromptBuilt → Generated → Persisted
//! ```
//!
//! Any unrecovered error moves the turn to `Failed`. Nothing is persisted
//! before `Generated`, so a rejected or failed turn leaves the session's
//! history untouched. Once generation succeeds the writes run in order
//! (user message, assistant message, state, context) and are not rolled
//! back if a later one fails.
//!
//! Turns on one session are serialized through the session manager's lock,
//! which `end` and `escalate` take as well; the whole turn, lock wait
//! included, is bounded by the turn timeout.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use rigchat_config::AppConfig;
use rigchat_core::error::{Error, Result, StoreError};
use rigchat_core::intent::{Entities, Intent, IntentResult};
use rigchat_core::message::{Message, MessageMetadata, TokenUsage};
use rigchat_core::provider::PromptMessage;
use rigchat_core::session::{Purpose, Session, SessionContext, SessionId, SessionState};
use rigchat_providers::{CompletionClient, CompletionOptions, TextStream};
use rigchat_security::ModerationGate;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::classifier::{EntityExtractor, IntentClassifier};
use crate::prompt::PromptAssembler;
use crate::retriever::KnowledgeRetriever;
use crate::session::SessionManager;

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    SessionResolved,
    Moderated,
    Classified,
    KnowledgeGathered,
    PromptBuilt,
    Generated,
    Persisted,
    Failed,
}

/// Everything a caller learns from one successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub reply: String,
    pub intent: IntentResult,
    pub entities: Entities,
    /// Titles of the knowledge entries the prompt was grounded on.
    pub sources: Vec<String>,
    pub tokens: TokenUsage,
    pub model: String,
    pub response_time_ms: u64,
    /// States visited, `Idle` through `Persisted`.
    pub trace: Vec<TurnState>,
}

/// One item of a streaming turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Fragment(String),
    /// Last item of a successful turn, sent after persistence.
    Done(Box<TurnOutcome>),
}

/// Reply fragments of a streaming turn, ending in [`TurnEvent::Done`] or an
/// error. Dropping it early abandons the turn without persisting anything.
pub struct TurnStream {
    inner: ReceiverStream<Result<TurnEvent>>,
}

impl TurnStream {
    /// Drain the stream and return the final outcome.
    pub async fn outcome(mut self) -> Result<TurnOutcome> {
        while let Some(event) = self.next().await {
            if let TurnEvent::Done(outcome) = event? {
                return Ok(*outcome);
            }
        }
        Err(Error::Internal("turn stream closed without an outcome".into()))
    }
}

impl Stream for TurnStream {
    type Item = Result<TurnEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// What the turn produced before persistence.
struct PreparedTurn {
    session: Session,
    text: String,
    intent: IntentResult,
    entities: Entities,
    sources: Vec<String>,
    prompt: Vec<PromptMessage>,
}

struct GeneratedReply {
    content: String,
    model: String,
    tokens: TokenUsage,
    response_time_ms: u64,
}

/// States visited by one turn, logged as they are entered.
struct Trace {
    session_id: SessionId,
    states: Vec<TurnState>,
}

impl Trace {
    fn new(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.clone(),
            states: vec![TurnState::Idle],
        }
    }

    fn enter(&mut self, state: TurnState) {
        debug!(session_id = %self.session_id, state = ?state, "Turn state");
        self.states.push(state);
    }

    fn fail(&mut self, err: &Error) {
        let from = self.states.last().copied().unwrap_or(TurnState::Idle);
        self.states.push(TurnState::Failed);
        if err.is_input_rejection() {
            info!(session_id = %self.session_id, from = ?from, "Turn rejected: {err}");
        } else {
            warn!(session_id = %self.session_id, from = ?from, "Turn failed: {err}");
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    moderation: Arc<ModerationGate>,
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    retriever: KnowledgeRetriever,
    assembler: PromptAssembler,
    client: Arc<CompletionClient>,
    turn_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        moderation: Arc<ModerationGate>,
        retriever: KnowledgeRetriever,
        client: Arc<CompletionClient>,
    ) -> Self {
        Self {
            sessions,
            moderation,
            classifier: IntentClassifier::new(),
            extractor: EntityExtractor::new(),
            retriever,
            assembler: PromptAssembler::default(),
            client,
            turn_timeout: Duration::from_secs(120),
        }
    }

    /// Apply the `[session]` and `[completion]` turn settings.
    pub fn configured(self, config: &AppConfig) -> Self {
        self.with_assembler(PromptAssembler::new(config.session.prompt_history_turns))
            .with_turn_timeout(config.completion.turn_timeout())
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one turn to completion.
    pub async fn handle(&self, id: &SessionId, raw: &str, user_id: Option<String>) -> Result<TurnOutcome> {
        let deadline = Instant::now() + self.turn_timeout;
        match tokio::time::timeout_at(deadline, self.run_turn(id, raw, user_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session_id = %id, timeout_secs = self.turn_timeout.as_secs(), "Turn timed out");
                Err(self.timed_out())
            }
        }
    }

    async fn run_turn(&self, id: &SessionId, raw: &str, user_id: Option<String>) -> Result<TurnOutcome> {
        let _guard = self.sessions.lock(id).await;
        let mut trace = Trace::new(id);

        let result = self.generate(id, raw, user_id, &mut trace).await;
        if let Err(e) = &result {
            trace.fail(e);
        }
        result
    }

    async fn generate(
        &self,
        id: &SessionId,
        raw: &str,
        user_id: Option<String>,
        trace: &mut Trace,
    ) -> Result<TurnOutcome> {
        let prepared = self.prepare(id, raw, user_id, trace).await?;
        let completion = self
            .client
            .complete_with_retry(prepared.prompt.clone(), &CompletionOptions::default())
            .await?;
        trace.enter(TurnState::Generated);

        let reply = GeneratedReply {
            content: completion.content,
            model: completion.model,
            tokens: completion.tokens,
            response_time_ms: completion.response_time_ms,
        };
        self.persist(prepared, reply, trace).await
    }

    /// Run one turn, streaming the reply as it is generated.
    ///
    /// The session lock is held until the stream finishes, so the next turn
    /// on this session waits for persistence.
    pub async fn handle_streaming(
        self: &Arc<Self>,
        id: &SessionId,
        raw: &str,
        user_id: Option<String>,
    ) -> Result<TurnStream> {
        let deadline = Instant::now() + self.turn_timeout;
        let mut trace = Trace::new(id);

        let setup = async {
            let guard = self.sessions.lock(id).await;
            let prepared = self.prepare(id, raw, user_id, &mut trace).await?;
            let text = self
                .client
                .stream(prepared.prompt.clone(), &CompletionOptions::default())
                .await?;
            Ok::<_, Error>((guard, prepared, text))
        };
        let (guard, prepared, text) = match tokio::time::timeout_at(deadline, setup).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                trace.fail(&e);
                return Err(e);
            }
            Err(_) => {
                warn!(session_id = %id, "Turn timed out before streaming started");
                return Err(self.timed_out());
            }
        };

        let (tx, rx) = mpsc::channel(32);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let driven = tokio::time::timeout_at(deadline, this.drive(prepared, text, &tx, &mut trace)).await;
            let result = driven.unwrap_or_else(|_| Err(this.timed_out()));
            match result {
                Ok(outcome) => {
                    let _ = tx.send(Ok(TurnEvent::Done(Box::new(outcome)))).await;
                }
                Err(e) => {
                    trace.fail(&e);
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(TurnStream {
            inner: ReceiverStream::new(rx),
        })
    }

    /// Forward fragments to the consumer, then persist the full reply.
    async fn drive(
        &self,
        prepared: PreparedTurn,
        mut text: TextStream,
        tx: &mpsc::Sender<Result<TurnEvent>>,
        trace: &mut Trace,
    ) -> Result<TurnOutcome> {
        let started = Instant::now();
        let mut content = String::new();
        loop {
            let next = tokio::select! {
                next = text.next() => next,
                () = tx.closed() => return Err(consumer_gone()),
            };
            match next {
                Some(Ok(fragment)) => {
                    content.push_str(&fragment);
                    if tx.send(Ok(TurnEvent::Fragment(fragment))).await.is_err() {
                        return Err(consumer_gone());
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        let summary = text.summary().await.ok_or_else(|| Error::ExternalService {
            service: "completion-stream".into(),
            status: None,
            message: "stream ended without a summary".into(),
        })?;
        trace.enter(TurnState::Generated);

        let reply = GeneratedReply {
            content,
            model: summary.model,
            tokens: summary.tokens,
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.persist(prepared, reply, trace).await
    }

    /// Stages `SessionResolved` through `PromptBuilt`. No writes besides
    /// creating a session for an unknown id.
    async fn prepare(
        &self,
        id: &SessionId,
        raw: &str,
        user_id: Option<String>,
        trace: &mut Trace,
    ) -> Result<PreparedTurn> {
        let session = self.resolve(id, user_id).await?;
        trace.enter(TurnState::SessionResolved);

        let text = self.moderation.screen(id.as_str(), raw).into_result()?;
        trace.enter(TurnState::Moderated);

        let intent = self.classifier.classify(&text, Some(&session.context));
        let entities = self.extractor.extract(&text);
        debug!(
            session_id = %id,
            intent = %intent.intent,
            confidence = intent.confidence,
            "Classified message"
        );
        trace.enter(TurnState::Classified);

        let knowledge = self.retriever.retrieve(&text, intent.intent, &entities).await;
        trace.enter(TurnState::KnowledgeGathered);

        let history = self
            .sessions
            .recent_history(id, self.assembler.history_turns())
            .await?;
        let instruction = self.assembler.system_instruction(&session.context);
        let prompt = self.assembler.assemble(&instruction, &knowledge, &history, &text);
        trace.enter(TurnState::PromptBuilt);

        Ok(PreparedTurn {
            session,
            text,
            intent,
            entities,
            sources: knowledge.into_iter().map(|k| k.title).collect(),
            prompt,
        })
    }

    /// Load an active session, or create one under `id` on first contact.
    async fn resolve(&self, id: &SessionId, user_id: Option<String>) -> Result<Session> {
        match self.sessions.get(id).await? {
            Some(session) if session.is_active() => Ok(session),
            Some(session) => Err(Error::SessionClosed {
                session_id: id.to_string(),
                status: session.status,
            }),
            None => match self.sessions.create_with_id(id.clone(), user_id).await {
                Ok(session) => Ok(session),
                // Another instance created it between our read and insert
                Err(Error::Database(StoreError::Conflict(_))) => self.sessions.require(id).await,
                Err(e) => Err(e),
            },
        }
    }

    /// User message, assistant message, state, context. In that order.
    async fn persist(&self, prepared: PreparedTurn, reply: GeneratedReply, trace: &mut Trace) -> Result<TurnOutcome> {
        let PreparedTurn {
            session,
            text,
            intent,
            entities,
            sources,
            ..
        } = prepared;
        let id = &session.session_id;

        let user_message = Message::user(text).with_metadata(MessageMetadata {
            intent: Some(intent.intent),
            entities: (!entities.is_empty()).then(|| entities.clone()),
            confidence: Some(intent.confidence),
            ..MessageMetadata::default()
        });
        self.sessions.append_message(id, &user_message).await?;

        let assistant_message = Message::assistant(reply.content.clone()).with_metadata(MessageMetadata {
            intent: Some(intent.intent),
            sources: sources.clone(),
            tokens: Some(reply.tokens),
            model: Some(reply.model.clone()),
            response_time_ms: Some(reply.response_time_ms),
            ..MessageMetadata::default()
        });
        self.sessions.append_message(id, &assistant_message).await?;

        let state = next_state(&session.state, intent.intent, &entities);
        self.sessions.update_state(id, &state).await?;

        let context = next_context(&session.context, intent.intent, &entities);
        if context != session.context {
            self.sessions.update_context(id, &context).await?;
        }
        trace.enter(TurnState::Persisted);

        info!(
            session_id = %id,
            intent = %intent.intent,
            sources = sources.len(),
            tokens = reply.tokens.total,
            response_time_ms = reply.response_time_ms,
            "Turn completed"
        );

        Ok(TurnOutcome {
            session_id: id.clone(),
            reply: reply.content,
            intent,
            entities,
            sources,
            tokens: reply.tokens,
            model: reply.model,
            response_time_ms: reply.response_time_ms,
            trace: trace.states.clone(),
        })
    }

    fn timed_out(&self) -> Error {
        Error::ExternalService {
            service: "orchestrator".into(),
            status: None,
            message: format!("turn exceeded {}s", self.turn_timeout.as_secs()),
        }
    }
}

fn consumer_gone() -> Error {
    Error::Internal("stream consumer went away".into())
}

// ── Session updates ───────────────────────────────────────────────────────

/// Topic is the first component, else the first purpose, else the intent label.
fn next_state(state: &SessionState, intent: Intent, entities: &Entities) -> SessionState {
    let topic = entities
        .component_types
        .first()
        .or_else(|| entities.purpose.first())
        .cloned()
        .unwrap_or_else(|| intent.as_str().to_string());
    SessionState {
        current_topic: Some(topic),
        last_intent: Some(intent),
        pending_actions: state.pending_actions.clone(),
    }
}

fn next_context(context: &SessionContext, intent: Intent, entities: &Entities) -> SessionContext {
    let mut next = context.clone();
    if intent != Intent::General {
        next.purpose = Purpose::from(intent);
    }

    let preferences = &mut next.user_profile.preferences;
    if let Some(budget) = entities.budget {
        preferences.insert(
            "budget".into(),
            json!({ "amount": budget.amount, "currency": budget.currency.as_str() }),
        );
    }
    merge_list(preferences, "brands", &entities.brands);
    merge_list(preferences, "usage", &entities.purpose);
    merge_list(preferences, "components", &entities.component_types);
    next
}

/// Append `values` to the string array at `key`, skipping duplicates.
fn merge_list(preferences: &mut serde_json::Map<String, Value>, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let mut merged: Vec<String> = match preferences.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    };
    for value in values {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    preferences.insert(key.into(), json!(merged));
}
