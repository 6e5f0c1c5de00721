use std::collections::BTreeMap;

use rigchat_core::intent::{Intent, IntentResult};
use rigchat_core::session::{Purpose, SessionContext};

use super::lexicon::{self, count_term};

/// Lexicon-scoring intent classifier.
///
/// Each intent scores one point per keyword occurrence. The highest score
/// wins, ties going to the earlier intent in [`Intent::ALL`]. When the
/// session already has a non-general purpose and the text hit that purpose's
/// lexicon at all, the purpose wins outright.
#[derive(Debug, Clone, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str, context: Option<&SessionContext>) -> IntentResult {
        let lowered = text.to_lowercase();
        let scores: BTreeMap<Intent, u32> = lexicon::INTENTS
            .iter()
            .map(|(intent, terms)| {
                let hits: usize = terms.iter().map(|t| count_term(&lowered, t)).sum();
                (*intent, u32::try_from(hits).unwrap_or(u32::MAX))
            })
            .collect();

        let total: u32 = scores.values().sum();
        if total == 0 {
            return IntentResult {
                intent: Intent::General,
                confidence: 0.5,
                scores,
            };
        }

        // Strict `>` keeps the earliest intent on ties
        let mut best = Intent::General;
        let mut best_score = 0;
        for intent in Intent::ALL {
            let score = scores.get(&intent).copied().unwrap_or(0);
            if score > best_score {
                best = intent;
                best_score = score;
            }
        }

        if let Some(purpose) = context.map(|c| c.purpose).filter(|p| *p != Purpose::General) {
            let sticky = purpose.as_intent();
            let sticky_score = scores.get(&sticky).copied().unwrap_or(0);
            if sticky_score > 0 {
                best = sticky;
                best_score = sticky_score;
            }
        }

        IntentResult {
            intent: best,
            confidence: best_score as f32 / total as f32,
            scores,
        }
    }
}
