//! Builds stores, cache and provider from configuration.

use std::sync::Arc;

use rigchat_config::AppConfig;
use rigchat_core::cache::Cache;
use rigchat_core::provider::Provider;
use rigchat_core::store::{KnowledgeStore, SessionStore};
use rigchat_pipeline::ChatService;
use rigchat_providers::CompletionClient;
use rigchat_store::{InMemoryCache, InMemoryStore, SqliteStore};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config() -> CliResult<AppConfig> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// The storage tiers named by `[storage]` and `[cache]`.
pub struct Backends {
    pub sessions: Arc<dyn SessionStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub cache: Option<Arc<dyn Cache>>,
}

impl Backends {
    pub async fn open(config: &AppConfig) -> CliResult<Self> {
        let (sessions, knowledge) = match config.storage.backend.as_str() {
            "memory" => {
                let store = Arc::new(InMemoryStore::new());
                (
                    store.clone() as Arc<dyn SessionStore>,
                    store as Arc<dyn KnowledgeStore>,
                )
            }
            _ => {
                let path = config.storage.database_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let store = Arc::new(SqliteStore::new(&path.to_string_lossy()).await?);
                (
                    store.clone() as Arc<dyn SessionStore>,
                    store as Arc<dyn KnowledgeStore>,
                )
            }
        };

        let cache: Option<Arc<dyn Cache>> = match config.cache.backend.as_str() {
            "none" => None,
            _ => Some(Arc::new(InMemoryCache::new()) as Arc<dyn Cache>),
        };

        tracing::debug!(
            storage = %config.storage.backend,
            cache = %config.cache.backend,
            "Backends opened"
        );
        Ok(Self {
            sessions,
            knowledge,
            cache,
        })
    }
}

pub fn provider(config: &AppConfig) -> CliResult<Arc<dyn Provider>> {
    rigchat_providers::build_from_config(config).map_err(|e| {
        let hint = format!(
            "{e}\n\n  Set it with one of:\n    export RIGCHAT_API_KEY=\"sk-...\"\n    or edit {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        Box::<dyn std::error::Error>::from(hint)
    })
}

/// A chat service over the configured backends and provider.
pub async fn chat_service(config: &AppConfig) -> CliResult<ChatService> {
    let provider = provider(config)?;
    let backends = Backends::open(config).await?;
    Ok(ChatService::build(
        config,
        provider,
        backends.sessions,
        backends.knowledge,
        backends.cache,
    ))
}

/// A completion client for embedding knowledge entries, when semantic
/// search is switched on and a provider can be built.
pub fn embedding_client(config: &AppConfig) -> Option<CompletionClient> {
    if !config.retrieval.semantic_search {
        return None;
    }
    match rigchat_providers::build_from_config(config) {
        Ok(provider) => Some(
            CompletionClient::from_config(provider, config)
                .with_embedding_model(&config.retrieval.embedding_model),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Semantic search enabled but no provider; skipping embeddings");
            None
        }
    }
}
