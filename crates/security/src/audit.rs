//! Audit logging for moderation decisions.
//!
//! Every rejected message is recorded with the session that sent it so
//! abuse patterns can be reviewed without trawling general logs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries kept in memory before the oldest are dropped.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// One rejected message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// Who sent the message, usually a session id.
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Why a message was turned away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    LengthExceeded { length: usize, max: usize },
    /// Nothing left after sanitization
    EmptyMessage,
    InjectionDetected,
    BlockedTerm,
}

/// Where audit entries go besides the in-memory ring.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Keeps the most recent rejections in memory and forwards each one to
/// its sinks.
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entries", &self.count())
            .field("capacity", &self.capacity)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_AUDIT_CAPACITY,
            sinks,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn ring(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: AuditEvent, actor: &str, details: Option<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.to_string(),
            details,
        };

        {
            let mut ring = self.ring();
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(entry.clone());
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.ring().iter().cloned().collect()
    }

    pub fn entries_for(&self, actor: &str) -> Vec<AuditEntry> {
        self.ring().iter().filter(|e| e.actor == actor).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.ring().len()
    }
}

/// Writes each entry as a `tracing` warning.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::warn!(
            actor = %entry.actor,
            event = ?entry.event,
            details = entry.details.as_deref().unwrap_or(""),
            "Message rejected by moderation"
        );
    }
}
