//! Moderation gate: sanitizes raw chat text and screens it before any
//! other pipeline stage sees it.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. raw length against the configured maximum
//! 2. sanitization (control bytes stripped, whitespace collapsed)
//! 3. prompt-injection and markup heuristics
//! 4. the configured blocked-terms list
//!
//! Downstream stages must only ever see [`ModerationVerdict::sanitized_text`].

use std::sync::Arc;

use regex_lite::Regex;
use rigchat_config::ModerationConfig;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditLogger};

/// Why a message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooLong,
    Empty,
    Injection,
    BlockedTerm,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooLong => "message_too_long",
            Self::Empty => "empty_message",
            Self::Injection => "prompt_injection",
            Self::BlockedTerm => "blocked_term",
        }
    }

    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TooLong => "Tin nhắn quá dài, vui lòng rút gọn.",
            Self::Empty => "Tin nhắn không được để trống.",
            Self::Injection => "Tin nhắn chứa nội dung không được phép.",
            Self::BlockedTerm => "Tin nhắn chứa từ ngữ không phù hợp.",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow/deny decision for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub allowed: bool,
    pub reason: Option<RejectReason>,
    /// Sanitized form of the input. Empty when the raw text was too long.
    pub sanitized_text: String,
}

impl ModerationVerdict {
    fn allow(sanitized_text: String) -> Self {
        Self {
            allowed: true,
            reason: None,
            sanitized_text,
        }
    }

    fn deny(reason: RejectReason, sanitized_text: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            sanitized_text,
        }
    }

    /// Convert a denial into the pipeline's input-rejection error.
    pub fn into_result(self) -> rigchat_core::Result<String> {
        match self.reason {
            None if self.allowed => Ok(self.sanitized_text),
            reason => {
                let reason = reason.unwrap_or(RejectReason::Injection);
                Err(rigchat_core::Error::Moderation {
                    reason: reason.as_str().into(),
                    message: reason.user_message().into(),
                })
            }
        }
    }
}

/// Injection heuristics, matched against the lowercased sanitized text.
/// Order matters only for which pattern gets reported.
const INJECTION_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(the\s+)?(previous|prior|above)\s+(instructions?|prompts?)",
    r"disregard\s+(all\s+)?(the\s+)?(previous|prior|above)",
    r"forget\s+(everything|all\s+(previous|prior))",
    r"you\s+are\s+now",
    r"act\s+as\s+if",
    r"pretend\s+(to\s+be|you\s+are)",
    r"(reveal|show|print)\s+(me\s+)?(your\s+)?system\s+prompt",
    r"bỏ\s+qua\s+(mọi|tất\s+cả|các)?\s*hướng\s+dẫn",
    r"<\s*/?\s*(script|iframe|object|embed)",
    r"javascript\s*:",
    r"on(error|load|click|mouseover)\s*=",
    r"\{\{.*\}\}",
];

/// Strip null and control characters, trim, and collapse whitespace runs.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Screens inbound messages.
pub struct ModerationGate {
    max_length: usize,
    injection: Vec<Regex>,
    blocked_terms: Vec<String>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for ModerationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationGate")
            .field("max_length", &self.max_length)
            .field("pattern_count", &self.injection.len())
            .field("blocked_terms", &self.blocked_terms.len())
            .finish()
    }
}

impl ModerationGate {
    pub fn new(max_length: usize, blocked_terms: Vec<String>) -> Self {
        let injection = INJECTION_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(pattern = %p, error = %e, "Invalid moderation pattern skipped");
                    None
                }
            })
            .collect();

        Self {
            max_length,
            injection,
            blocked_terms: blocked_terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            audit: None,
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.max_message_length, config.blocked_terms.clone())
    }

    /// Record rejections through an audit logger.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Screen one raw message.
    pub fn moderate(&self, raw: &str) -> ModerationVerdict {
        let length = raw.chars().count();
        if length > self.max_length {
            return ModerationVerdict::deny(RejectReason::TooLong, String::new());
        }

        let sanitized = sanitize(raw);
        if sanitized.is_empty() {
            return ModerationVerdict::deny(RejectReason::Empty, sanitized);
        }

        let lowered = sanitized.to_lowercase();
        if self.injection.iter().any(|re| re.is_match(&lowered)) {
            return ModerationVerdict::deny(RejectReason::Injection, sanitized);
        }

        if self.blocked_terms.iter().any(|t| lowered.contains(t.as_str())) {
            return ModerationVerdict::deny(RejectReason::BlockedTerm, sanitized);
        }

        ModerationVerdict::allow(sanitized)
    }

    /// Screen a message on behalf of `actor` (usually a session id),
    /// auditing any rejection.
    pub fn screen(&self, actor: &str, raw: &str) -> ModerationVerdict {
        let verdict = self.moderate(raw);
        if let (Some(reason), Some(audit)) = (verdict.reason, &self.audit) {
            let event = match reason {
                RejectReason::TooLong => AuditEvent::LengthExceeded {
                    length: raw.chars().count(),
                    max: self.max_length,
                },
                RejectReason::Empty => AuditEvent::EmptyMessage,
                RejectReason::Injection => AuditEvent::InjectionDetected,
                RejectReason::BlockedTerm => AuditEvent::BlockedTerm,
            };
            audit.record(event, actor, None);
        }
        verdict
    }
}
