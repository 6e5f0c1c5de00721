//! Knowledge retrieval for prompt grounding.
//!
//! Lexical search is always on, filtered to the category that matches the
//! turn's intent. Semantic search is optional: when enabled and a completion
//! client is attached, the query is embedded and compared against every
//! embedded entry, and the two result lists are merged.
//!
//! Retrieval never fails a turn. Any error degrades to "no knowledge".

use std::sync::Arc;

use chrono::Utc;
use rigchat_config::RetrievalConfig;
use rigchat_core::error::Result;
use rigchat_core::intent::{Entities, Intent};
use rigchat_core::knowledge::{KnowledgeCategory, KnowledgeEntry};
use rigchat_core::store::{KnowledgeQuery, KnowledgeStore};
use rigchat_providers::CompletionClient;
use rigchat_store::{merge_results, vector_search};
use tracing::{debug, warn};

pub struct KnowledgeRetriever {
    store: Arc<dyn KnowledgeStore>,
    /// Embeds queries when semantic search is on.
    embedder: Option<Arc<CompletionClient>>,
    semantic: bool,
    threshold: f32,
    limit: usize,
}

impl KnowledgeRetriever {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            store,
            embedder: None,
            semantic: false,
            threshold: 0.7,
            limit: 5,
        }
    }

    pub fn from_config(store: Arc<dyn KnowledgeStore>, config: &RetrievalConfig) -> Self {
        Self::new(store)
            .with_limit(config.limit)
            .with_threshold(config.similarity_threshold)
    }

    /// Enable semantic search through `client`'s embedding model.
    pub fn with_semantic(mut self, client: Arc<CompletionClient>) -> Self {
        self.embedder = Some(client);
        self.semantic = true;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Up to `limit` entries relevant to `text`, best first. Empty on any failure.
    pub async fn retrieve(&self, text: &str, intent: Intent, entities: &Entities) -> Vec<KnowledgeEntry> {
        match self.try_retrieve(text, intent, entities).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    debug!(count = entries.len(), intent = %intent, "Retrieved knowledge");
                }
                self.record_access(&entries).await;
                entries
            }
            Err(e) => {
                warn!("Knowledge retrieval failed: {e}");
                vec![]
            }
        }
    }

    async fn try_retrieve(&self, text: &str, intent: Intent, entities: &Entities) -> Result<Vec<KnowledgeEntry>> {
        let query = KnowledgeQuery {
            text: query_text(text, entities),
            category: KnowledgeCategory::for_intent(intent),
            limit: self.limit * 2,
        };
        let mut lexical = self.store.search(&query).await?;

        let Some(embedder) = self.embedder.as_ref().filter(|_| self.semantic) else {
            lexical.truncate(self.limit);
            return Ok(lexical);
        };

        let semantic = match embedder.embed(text).await {
            Ok(vector) => {
                let candidates = self.store.embedded().await?;
                vector_search(&candidates, &vector, self.limit * 2, self.threshold)
            }
            Err(e) => {
                // Lexical results are still useful on their own
                warn!("Query embedding failed, using lexical results only: {e}");
                vec![]
            }
        };

        Ok(merge_results(lexical, semantic, self.limit))
    }

    /// Bump usage counters. Best-effort.
    async fn record_access(&self, entries: &[KnowledgeEntry]) {
        let now = Utc::now();
        for entry in entries {
            if let Err(e) = self.store.record_access(&entry.id, now).await {
                warn!(entry_id = %entry.id, "Failed to record knowledge access: {e}");
            }
        }
    }
}

/// The user text plus extracted entity terms, so entity-only matches still rank.
fn query_text(text: &str, entities: &Entities) -> String {
    let mut query = text.to_string();
    for term in entities.component_types.iter().chain(&entities.brands) {
        query.push(' ');
        query.push_str(term);
    }
    query
}
