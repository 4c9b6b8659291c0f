//! Error types for sqlpanel.

use thiserror::Error;

/// The main error type for sqlpanel operations.
///
/// Every variant terminates the current request; nothing is retried.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A client-supplied name, descriptor, or parameter failed validation.
    #[error("{0}")]
    Validation(String),

    /// Credentials were required but not supplied.
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials were supplied but rejected.
    #[error("{0}")]
    Forbidden(String),

    /// The requested database, table, or record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The target already exists.
    #[error("{0}")]
    Conflict(String),

    /// Too many requests from one client address.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// The SQL engine rejected a statement. Carries the engine's text verbatim.
    #[error("{0}")]
    Execution(String),

    /// Could not reach or authenticate against the database server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reply payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PanelError {
    /// Create a validation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited => 429,
            Self::Execution(_) => 500,
            Self::Connection(_) => 500,
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) => 500,
        }
    }

    /// Prefix the message of an execution error, leaving other kinds untouched.
    ///
    /// Used to say which step failed while keeping the engine text intact.
    pub fn context(self, step: &str) -> Self {
        match self {
            Self::Execution(msg) => Self::Execution(format!("{}: {}", step, msg)),
            other => other,
        }
    }
}

/// Result type alias for sqlpanel operations.
pub type PanelResult<T> = Result<T, PanelError>;
