//! Knowledge entries: curated reference documents used to ground replies.

use crate::intent::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Product,
    Compatibility,
    Troubleshooting,
    General,
    BuildGuide,
}

impl KnowledgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Compatibility => "compatibility",
            Self::Troubleshooting => "troubleshooting",
            Self::General => "general",
            Self::BuildGuide => "build_guide",
        }
    }

    /// The category an intent restricts lexical retrieval to. `None` = no filter.
    pub fn for_intent(intent: Intent) -> Option<Self> {
        match intent {
            Intent::BuildHelp => Some(Self::BuildGuide),
            Intent::ProductInquiry => Some(Self::Product),
            Intent::Support => Some(Self::Troubleshooting),
            Intent::General => None,
        }
    }
}

impl std::str::FromStr for KnowledgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Self::Product),
            "compatibility" => Ok(Self::Compatibility),
            "troubleshooting" => Ok(Self::Troubleshooting),
            "general" => Ok(Self::General),
            "build_guide" => Ok(Self::BuildGuide),
            other => Err(format!("unknown knowledge category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeStatus {
    #[default]
    Active,
    Draft,
    Archived,
}

impl KnowledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for KnowledgeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "draft" => Ok(Self::Draft),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown knowledge status '{other}'")),
        }
    }
}

/// Access statistics, updated as a side effect of retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeUsage {
    #[serde(default)]
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Curator-assigned effectiveness in [0, 1].
    #[serde(default)]
    pub effectiveness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Store-assigned id. Empty before insertion.
    #[serde(default)]
    pub id: String,

    pub title: String,

    pub content: String,

    pub category: KnowledgeCategory,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub usage: KnowledgeUsage,

    #[serde(default)]
    pub status: KnowledgeStatus,

    /// Relevance score (set by search operations)
    #[serde(default, skip_serializing)]
    pub score: f32,
}

impl KnowledgeEntry {
    /// A new active entry with no id yet.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        category: KnowledgeCategory,
    ) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            content: content.into(),
            category,
            tags: Vec::new(),
            keywords: Vec::new(),
            embedding: None,
            usage: KnowledgeUsage::default(),
            status: KnowledgeStatus::Active,
            score: 0.0,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
