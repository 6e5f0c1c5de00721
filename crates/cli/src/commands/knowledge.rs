//! `rigchat knowledge import` and `rigchat knowledge search`.

use std::path::Path;
use std::sync::Arc;

use rigchat_core::intent::Intent;
use rigchat_core::knowledge::KnowledgeEntry;
use rigchat_core::store::KnowledgeStore;
use rigchat_pipeline::{EntityExtractor, IntentClassifier, KnowledgeRetriever};
use rigchat_providers::CompletionClient;

use crate::runtime::{self, Backends, CliResult};

pub async fn import(file: &Path) -> CliResult<()> {
    let config = runtime::load_config()?;
    let raw = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let entries = parse_entries(&raw)?;

    let backends = Backends::open(&config).await?;
    let client = runtime::embedding_client(&config);
    let report = import_entries(backends.knowledge.as_ref(), client.as_ref(), entries).await?;

    println!("✅ Imported {} entries from {}", report.imported, file.display());
    if report.embedded > 0 {
        println!("  Embedded:  {}", report.embedded);
    }
    println!("  Total:     {}", backends.knowledge.count().await?);
    Ok(())
}

pub async fn search(query: &str, intent: Option<&str>) -> CliResult<()> {
    let config = runtime::load_config()?;
    let backends = Backends::open(&config).await?;

    let intent = match intent {
        Some(label) => label.parse::<Intent>()?,
        None => IntentClassifier::new().classify(query, None).intent,
    };
    let entities = EntityExtractor::new().extract(query);

    let mut retriever = KnowledgeRetriever::from_config(backends.knowledge, &config.retrieval);
    if let Some(client) = runtime::embedding_client(&config) {
        retriever = retriever.with_semantic(Arc::new(client));
    }
    let results = retriever.retrieve(query, intent, &entities).await;

    if results.is_empty() {
        println!("No knowledge found for: {query} (intent: {})", intent.as_str());
        return Ok(());
    }

    println!(
        "Found {} entries for: {query} (intent: {})\n",
        results.len(),
        intent.as_str()
    );
    for (i, entry) in results.iter().enumerate() {
        println!(
            "  {}. [{}] {} (score: {:.2})",
            i + 1,
            entry.category.as_str(),
            entry.title,
            entry.score
        );
        let preview: String = entry.content.chars().take(120).collect();
        println!("     {preview}");
        println!();
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct ImportReport {
    imported: usize,
    embedded: usize,
}

/// A JSON array of entries; titles and content must be non-blank.
fn parse_entries(raw: &str) -> CliResult<Vec<KnowledgeEntry>> {
    let entries: Vec<KnowledgeEntry> =
        serde_json::from_str(raw).map_err(|e| format!("Invalid knowledge file: {e}"))?;
    for (i, entry) in entries.iter().enumerate() {
        if entry.title.trim().is_empty() || entry.content.trim().is_empty() {
            return Err(format!("entry #{} has an empty title or content", i + 1).into());
        }
    }
    Ok(entries)
}

/// Insert entries, embedding those without a vector when a client is given.
/// An embedding failure keeps the entry lexical-only.
async fn import_entries(
    store: &dyn KnowledgeStore,
    client: Option<&CompletionClient>,
    entries: Vec<KnowledgeEntry>,
) -> CliResult<ImportReport> {
    let mut report = ImportReport::default();
    for mut entry in entries {
        if let (Some(client), None) = (client, entry.embedding.as_ref()) {
            let text = format!("{}\n{}", entry.title, entry.content);
            match client.embed(&text).await {
                Ok(vector) => {
                    entry.embedding = Some(vector);
                    report.embedded += 1;
                }
                Err(e) => tracing::warn!(title = %entry.title, error = %e, "Embedding failed"),
            }
        }
        store.insert(entry).await?;
        report.imported += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rigchat_core::error::ProviderError;
    use rigchat_core::knowledge::KnowledgeCategory;
    use rigchat_core::provider::{
        EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    };
    use rigchat_config::AppConfig;
    use rigchat_store::InMemoryStore;

    struct EmbedOnly;

    #[async_trait]
    impl Provider for EmbedOnly {
        fn name(&self) -> &str {
            "embed_only"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("chat disabled".into()))
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
            })
        }
    }

    const FILE: &str = r#"[
        {"title": "Chọn nguồn cho RTX 4070", "content": "Nên dùng nguồn 650W 80 Plus Gold.", "category": "build_guide", "keywords": ["nguồn", "psu"]},
        {"title": "Máy không lên nguồn", "content": "Kiểm tra công tắc PSU và dây 24-pin.", "category": "troubleshooting"}
    ]"#;

    #[test]
    fn parses_a_knowledge_file() {
        let entries = parse_entries(FILE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, KnowledgeCategory::BuildGuide);
        assert_eq!(entries[0].keywords, vec!["nguồn", "psu"]);
    }

    #[test]
    fn blank_entries_are_rejected() {
        let raw = r#"[{"title": " ", "content": "x", "category": "general"}]"#;
        let err = parse_entries(raw).unwrap_err();
        assert!(err.to_string().contains("entry #1"));

        assert!(parse_entries("{not json").is_err());
    }

    #[tokio::test]
    async fn import_without_embeddings() {
        let store = InMemoryStore::new();
        let report = import_entries(&store, None, parse_entries(FILE).unwrap())
            .await
            .unwrap();
        assert_eq!(report, ImportReport { imported: 2, embedded: 0 });
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.embedded().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_embeds_when_a_client_is_given() {
        let store = InMemoryStore::new();
        let client = CompletionClient::from_config(Arc::new(EmbedOnly), &AppConfig::default());
        let report = import_entries(&store, Some(&client), parse_entries(FILE).unwrap())
            .await
            .unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(store.embedded().await.unwrap().len(), 2);
    }
}
