//! Input screening for RigChat.
//!
//! - Moderation gate (sanitization, injection heuristics, blocked terms)
//! - Audit logging of rejected messages

pub mod audit;
pub mod moderation;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditSink, TracingSink, DEFAULT_AUDIT_CAPACITY};
pub use moderation::{ModerationGate, ModerationVerdict, RejectReason, sanitize};
