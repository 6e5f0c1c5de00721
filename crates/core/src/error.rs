//! Error types for the RigChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! is what callers of the pipeline see, and [`Error::kind`] folds every
//! variant onto the caller-facing taxonomy.

use crate::session::SessionStatus;
use thiserror::Error;

/// The top-level error type for all RigChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input rejection ---
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Message rejected by moderation ({reason}): {message}")]
    Moderation { reason: String, message: String },

    #[error("Session {session_id} is {status} and no longer accepts messages")]
    SessionClosed {
        session_id: String,
        status: SessionStatus,
    },

    // --- Lookups ---
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // --- Upstream services ---
    #[error("External service '{service}' failed{}: {message}", status_suffix(.status))]
    ExternalService {
        service: String,
        status: Option<u16>,
        message: String,
    },

    // --- Durable store ---
    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status: {code})"),
        None => String::new(),
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was persisted.
    Validation,
    /// A referenced session or knowledge entry does not exist.
    NotFound,
    /// The provider or another dependent service failed.
    ExternalService,
    /// The durable store failed.
    Database,
}

impl Error {
    /// Shorthand for a missing session.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "session",
            id: id.into(),
        }
    }

    /// Classify this error into the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Moderation { .. } | Self::SessionClosed { .. } => {
                ErrorKind::Validation
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::Database,
            Self::ExternalService { .. }
            | Self::Config { .. }
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::ExternalService,
        }
    }

    /// True when the user's input was refused ("your input was rejected").
    pub fn is_input_rejection(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// True when retrying the same request could succeed ("the system is degraded").
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::ExternalService | ErrorKind::Database)
    }

    /// Upstream status code, when one was reported.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ExternalService { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Self::ExternalService {
            service: "completion-provider".into(),
            status: err.status_code(),
            message: err.to_string(),
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// The HTTP status the provider answered with, if the failure came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            Self::RateLimited { .. } => Some(429),
            Self::AuthenticationFailed(_) => Some(401),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Cache failures. Never fatal: the session manager logs and falls back to the store.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type at key {0}")]
    WrongType(String),
}
