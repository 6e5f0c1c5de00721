//! Intent labels and structured entities derived from user text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse classification of what the user is trying to do.
///
/// Declaration order matters: it is the tie-break order used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BuildHelp,
    ProductInquiry,
    Support,
    General,
}

impl Intent {
    /// All intents in declaration (tie-break) order.
    pub const ALL: [Intent; 4] = [
        Intent::BuildHelp,
        Intent::ProductInquiry,
        Intent::Support,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildHelp => "build_help",
            Self::ProductInquiry => "product_inquiry",
            Self::Support => "support",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown intent '{s}'"))
    }
}

/// Output of intent classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    /// Share of the lexicon hits that went to `intent`, in [0, 1].
    pub confidence: f32,
    /// Raw hit count per intent.
    pub scores: BTreeMap<Intent, u32>,
}

/// Currency of an extracted budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Vnd,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vnd => "VND",
            Self::Usd => "USD",
        }
    }
}

/// A budget parsed from free text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub amount: u64,
    pub currency: Currency,
}

/// Structured values extracted from one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purpose: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.purpose.is_empty()
            && self.component_types.is_empty()
            && self.brands.is_empty()
    }
}
