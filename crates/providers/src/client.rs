//! Completion client: the pipeline's single entry point to the generative
//! provider.
//!
//! Merges process-wide defaults with per-call overrides, times each call,
//! retries with exponential backoff, and exposes streaming replies as a
//! [`TextStream`] of text fragments.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use rigchat_config::AppConfig;
use rigchat_core::error::{Error, ProviderError};
use rigchat_core::message::TokenUsage;
use rigchat_core::provider::{EmbeddingRequest, PromptMessage, Provider, ProviderRequest};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Process-wide completion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Per-call overrides. `None` fields fall back to [`CompletionDefaults`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Retry schedule for [`CompletionClient::complete_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt. Doubles for every attempt after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait inserted after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// One finished completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub finish_reason: Option<String>,
    pub response_time_ms: u64,
}

pub struct CompletionClient {
    provider: Arc<dyn Provider>,
    defaults: CompletionDefaults,
    retry: RetryPolicy,
    embedding_model: String,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn Provider>, defaults: CompletionDefaults) -> Self {
        Self {
            provider,
            defaults,
            retry: RetryPolicy::default(),
            embedding_model: "text-embedding-3-small".into(),
        }
    }

    /// Build from the `[completion]` and `[retrieval]` config sections.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        let c = &config.completion;
        Self::new(
            provider,
            CompletionDefaults {
                model: c.model.clone(),
                max_tokens: c.max_tokens,
                temperature: c.temperature,
            },
        )
        .with_retry(RetryPolicy {
            max_attempts: c.max_attempts,
            base_delay: c.retry_base_delay(),
        })
        .with_embedding_model(config.retrieval.embedding_model.clone())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn defaults(&self) -> &CompletionDefaults {
        &self.defaults
    }

    fn request(&self, messages: Vec<PromptMessage>, options: &CompletionOptions, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: options.model.clone().unwrap_or_else(|| self.defaults.model.clone()),
            messages,
            temperature: options.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: Some(options.max_tokens.unwrap_or(self.defaults.max_tokens)),
            stream,
        }
    }

    /// Classify a provider failure as an external-service error.
    fn classify(&self, err: ProviderError) -> Error {
        Error::ExternalService {
            service: self.provider.name().to_string(),
            status: err.status_code(),
            message: err.to_string(),
        }
    }

    /// One provider call, no retry.
    pub async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        options: &CompletionOptions,
    ) -> Result<Completion, Error> {
        let request = self.request(messages, options, false);
        let started = Instant::now();
        let response = self.provider.complete(request).await.map_err(|e| self.classify(e))?;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(
            provider = %self.provider.name(),
            model = %response.model,
            response_time_ms,
            "Completion received"
        );

        Ok(Completion {
            content: response.content,
            model: response.model,
            tokens: response.usage.unwrap_or_default(),
            finish_reason: response.finish_reason,
            response_time_ms,
        })
    }

    /// [`complete`](Self::complete) with exponential backoff on any failure.
    ///
    /// Every error is retried the same way; the last one is returned once
    /// attempts run out.
    pub async fn complete_with_retry(
        &self,
        messages: Vec<PromptMessage>,
        options: &CompletionOptions,
    ) -> Result<Completion, Error> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.complete(messages.clone(), options).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Completion failed, giving up");
                    return Err(e);
                }
            }
        }
    }

    /// Stream reply fragments as they arrive.
    ///
    /// Dropping the returned stream stops the reader and closes the
    /// upstream connection.
    pub async fn stream(
        &self,
        messages: Vec<PromptMessage>,
        options: &CompletionOptions,
    ) -> Result<TextStream, Error> {
        let request = self.request(messages, options, true);
        let model = request.model.clone();
        let mut chunks = self.provider.stream(request).await.map_err(|e| self.classify(e))?;

        let service = self.provider.name().to_string();
        let (tx, rx) = mpsc::channel(32);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let mut summary = StreamSummary {
                model,
                tokens: TokenUsage::default(),
                finish_reason: None,
            };
            loop {
                let next = tokio::select! {
                    next = chunks.recv() => next,
                    // Consumer went away; dropping `chunks` stops the provider reader
                    () = tx.closed() => return,
                };
                match next {
                    Some(Ok(chunk)) => {
                        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        if let Some(usage) = chunk.usage {
                            summary.tokens = usage;
                        }
                        if chunk.finish_reason.is_some() {
                            summary.finish_reason = chunk.finish_reason;
                        }
                        if chunk.done {
                            let _ = done_tx.send(summary);
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(Error::ExternalService {
                                service: service.clone(),
                                status: e.status_code(),
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                    None => {
                        let _ = tx
                            .send(Err(Error::ExternalService {
                                service: service.clone(),
                                status: None,
                                message: "stream ended before completion".into(),
                            }))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(TextStream {
            inner: ReceiverStream::new(rx),
            summary: Some(done_rx),
        })
    }

    /// Embed one text with the configured embedding model.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| self.classify(e))?;

        response.embeddings.into_iter().next().ok_or_else(|| Error::ExternalService {
            service: self.provider.name().to_string(),
            status: None,
            message: "empty embedding response".into(),
        })
    }
}

/// Model, usage and stop reason of a stream that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub model: String,
    pub tokens: TokenUsage,
    pub finish_reason: Option<String>,
}

/// A finite, non-restartable stream of reply fragments.
///
/// Yields `Err` at most once, as the final item, when the provider fails
/// mid-stream.
pub struct TextStream {
    inner: ReceiverStream<Result<String, Error>>,
    summary: Option<tokio::sync::oneshot::Receiver<StreamSummary>>,
}

impl TextStream {
    /// Summary of the finished stream. `None` unless the stream was read to
    /// its end without error.
    pub async fn summary(&mut self) -> Option<StreamSummary> {
        self.summary.take()?.await.ok()
    }
}

impl Stream for TextStream {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
