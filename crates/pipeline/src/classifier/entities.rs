use regex_lite::Regex;
use rigchat_core::intent::{Budget, Currency, Entities};

use super::lexicon::{self, labels_in};

/// A budget pattern and the multiplier applied to its captured number.
struct BudgetPattern {
    regex: Regex,
    multiplier: f64,
    /// Separators inside the number are thousands grouping, not decimals.
    grouped: bool,
}

/// Tried in order; the first match wins.
const BUDGET_PATTERNS: &[(&str, f64, bool)] = &[
    (r"(\d+(?:[.,]\d+)?)\s*(?:triệu|trieu|million|tr)\b(?:\s*(?:usd|\$))?", 1_000_000.0, false),
    (r"(\d+(?:[.,]\d+)?)\s*(?:nghìn|ngàn|nghin|ngan|thousand|k)\b(?:\s*(?:usd|\$))?", 1_000.0, false),
    (r"\$\s*(\d[\d,]*(?:\.\d+)?)", 1.0, true),
    (r"(\d[\d,]*(?:\.\d+)?)\s*(?:usd|\$|dollars?)", 1.0, true),
    (r"(\d[\d.,]*)\s*(?:vnd|vnđ|đồng|đ)", 1.0, true),
];

/// Pulls budget, purposes, component types and brands out of free text.
pub struct EntityExtractor {
    budget: Vec<BudgetPattern>,
}

impl std::fmt::Debug for EntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityExtractor")
            .field("budget_patterns", &self.budget.len())
            .finish()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    pub fn new() -> Self {
        let budget = BUDGET_PATTERNS
            .iter()
            .filter_map(|(pattern, multiplier, grouped)| match Regex::new(pattern) {
                Ok(regex) => Some(BudgetPattern {
                    regex,
                    multiplier: *multiplier,
                    grouped: *grouped,
                }),
                Err(e) => {
                    tracing::error!(pattern = %pattern, error = %e, "Invalid budget pattern skipped");
                    None
                }
            })
            .collect();
        Self { budget }
    }

    pub fn extract(&self, text: &str) -> Entities {
        let lowered = text.to_lowercase();
        Entities {
            budget: self.budget(&lowered),
            purpose: labels_in(&lowered, lexicon::PURPOSES),
            component_types: labels_in(&lowered, lexicon::COMPONENTS),
            brands: labels_in(&lowered, lexicon::BRANDS),
        }
    }

    fn budget(&self, lowered: &str) -> Option<Budget> {
        self.budget.iter().find_map(|pattern| {
            let caps = pattern.regex.captures(lowered)?;
            let whole = caps.get(0)?.as_str();
            let number = parse_number(caps.get(1)?.as_str(), pattern.grouped)?;
            let amount = (number * pattern.multiplier).round();
            if !amount.is_finite() || amount <= 0.0 || amount > u64::MAX as f64 {
                return None;
            }
            let currency = if whole.contains("usd") || whole.contains('$') {
                Currency::Usd
            } else {
                Currency::Vnd
            };
            Some(Budget {
                amount: amount as u64,
                currency,
            })
        })
    }
}

/// Parse a captured number. Grouped numbers drop `.`/`,` separators except
/// a trailing `.dd` decimal part; ungrouped ones treat `,` as a decimal point.
fn parse_number(raw: &str, grouped: bool) -> Option<f64> {
    let cleaned = if grouped {
        match raw.rsplit_once('.') {
            // "1,299.99" keeps its cents; "15.000.000" is all grouping
            Some((head, tail)) if tail.len() != 3 && !tail.is_empty() => {
                format!("{}.{tail}", head.replace([',', '.'], ""))
            }
            _ => raw.replace([',', '.'], ""),
        }
    } else {
        raw.replace(',', ".")
    };
    cleaned.parse().ok()
}
