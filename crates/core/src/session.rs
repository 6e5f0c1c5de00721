//! Session domain types.
//!
//! A session is one ongoing conversation: its context (what the user is here
//! for, who they are), the pipeline's working state, the append-only message
//! history, and a lifecycle status that only ever moves forward.

use crate::error::{Error, Result};
use crate::intent::Intent;
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept an externally supplied id after a shape check.
    ///
    /// Ids are 1..=128 chars of ASCII alphanumerics, `-` or `_`.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= 128
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::Validation(format!("malformed session id '{s}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the user opened the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    #[default]
    General,
    BuildHelp,
    Support,
    ProductInquiry,
}

impl Purpose {
    /// The intent this purpose keeps "sticky" during classification.
    pub fn as_intent(&self) -> Intent {
        match self {
            Self::General => Intent::General,
            Self::BuildHelp => Intent::BuildHelp,
            Self::Support => Intent::Support,
            Self::ProductInquiry => Intent::ProductInquiry,
        }
    }
}

impl From<Intent> for Purpose {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::General => Self::General,
            Intent::BuildHelp => Self::BuildHelp,
            Intent::Support => Self::Support,
            Intent::ProductInquiry => Self::ProductInquiry,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Expert,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default)]
    pub user_profile: UserProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<Intent>,
    #[serde(default)]
    pub pending_actions: Vec<String>,
}

/// Lifecycle status. Moves `active → ended` or `active → escalated`, never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Ended,
    Escalated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Escalated => "escalated",
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Ended) | (Self::Active, Self::Escalated)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            "escalated" => Ok(Self::Escalated),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// End-of-conversation feedback from the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Feedback {
    pub fn validate(&self) -> Result<()> {
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(Error::Validation(format!(
                    "rating must be between 1 and 5, got {rating}"
                )));
            }
        }
        if self.rating.is_none()
            && self.helpful.is_none()
            && self.resolved.is_none()
            && self.comments.is_none()
        {
            return Err(Error::Validation("feedback is empty".into()));
        }
        Ok(())
    }
}

/// One conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub context: SessionContext,

    #[serde(default)]
    pub state: SessionState,

    /// Append-only, insertion-ordered.
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub status: SessionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Milliseconds between creation and end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl Session {
    /// A fresh active session with default context and state.
    pub fn new(session_id: SessionId, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            context: SessionContext::default(),
            state: SessionState::default(),
            messages: Vec::new(),
            status: SessionStatus::Active,
            feedback: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
            duration_ms: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Move to `next`, stamping end time and duration on the way out.
    pub fn transition(&mut self, next: SessionStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Validation(format!(
                "session {} cannot move from {} to {}",
                self.session_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = at;
        if next == SessionStatus::Ended {
            self.ended_at = Some(at);
            self.duration_ms = Some((at - self.created_at).num_milliseconds());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_defaults() {
        let session = Session::new(SessionId::new(), None);
        assert!(session.is_active());
        assert_eq!(session.context.purpose, Purpose::General);
        assert_eq!(
            session.context.user_profile.experience_level,
            ExperienceLevel::Beginner
        );
        assert!(session.messages.is_empty());
    }

    #[test]
    fn status_moves_forward_only() {
        let mut session = Session::new(SessionId::new(), None);
        let later = session.created_at + chrono::Duration::seconds(90);
        session.transition(SessionStatus::Ended, later).unwrap();
        assert_eq!(session.ended_at, Some(later));
        assert_eq!(session.duration_ms, Some(90_000));

        assert!(session.transition(SessionStatus::Active, Utc::now()).is_err());
        assert!(session.transition(SessionStatus::Escalated, Utc::now()).is_err());
    }

    #[test]
    fn escalation_does_not_stamp_end() {
        let mut session = Session::new(SessionId::new(), None);
        session
            .transition(SessionStatus::Escalated, Utc::now())
            .unwrap();
        assert_eq!(session.status, SessionStatus::Escalated);
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn session_id_shape_check() {
        assert!(SessionId::parse("abc-123_XYZ").is_ok());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("has space").is_err());
        assert!(SessionId::parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn feedback_rating_bounds() {
        let ok = Feedback {
            rating: Some(5),
            ..Feedback::default()
        };
        assert!(ok.validate().is_ok());

        let bad = Feedback {
            rating: Some(0),
            ..Feedback::default()
        };
        assert!(bad.validate().is_err());
        assert!(Feedback::default().validate().is_err());
    }

    #[test]
    fn session_serializes_camel_case() {
        let session = Session::new(SessionId("s1".into()), Some("u1".into()));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["status"], "active");
        assert_eq!(json["context"]["purpose"], "general");
    }
}
