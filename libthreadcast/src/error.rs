//! Error types for Threadcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThreadcastError>;

#[derive(Error, Debug)]
pub enum ThreadcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every attempt for one message in a thread failed.
    ///
    /// The display text matches what callers of the HTTP endpoint see and
    /// carries the platform's own wording without the variant prefix.
    #[error("Failed to send tweet after {attempts} attempts. Last error: {}", .last_error.message())]
    ChainExhausted {
        attempts: u32,
        last_error: PlatformError,
    },
}

impl ThreadcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ThreadcastError::InvalidInput(_) => 3,
            ThreadcastError::Platform(e) if e.is_auth_related() => 2,
            ThreadcastError::Platform(_) => 1,
            ThreadcastError::ChainExhausted { .. } => 1,
            ThreadcastError::Config(_) => 1,
        }
    }

    /// The platform failure behind this error, if there is one
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            ThreadcastError::Platform(e) => Some(e),
            ThreadcastError::ChainExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

/// How the retry loop should treat a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying as-is after a backoff
    Transient,
    /// Re-login before the next attempt
    SessionExpired,
    /// Retrying cannot help
    Fatal,
}

impl PlatformError {
    /// Structured classification of this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            PlatformError::Authentication(_) | PlatformError::SessionExpired(_) => {
                FailureKind::SessionExpired
            }
            PlatformError::Validation(_) => FailureKind::Fatal,
            PlatformError::Posting(_) | PlatformError::Network(_) | PlatformError::RateLimit(_) => {
                FailureKind::Transient
            }
        }
    }

    /// Classification by looking for session keywords in the platform's
    /// message.
    ///
    /// Compatibility fallback for deployments that relied on the message
    /// wording. The match is case-sensitive and ignores the variant, so
    /// "Session" or "Unauthorized" do not count. Never reports `Fatal`.
    pub fn kind_from_text(&self) -> FailureKind {
        let text = self.message();
        if text.contains("session") || text.contains("unauthorized") {
            FailureKind::SessionExpired
        } else {
            FailureKind::Transient
        }
    }

    /// The message carried by the variant, without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            PlatformError::Authentication(m)
            | PlatformError::SessionExpired(m)
            | PlatformError::Validation(m)
            | PlatformError::Posting(m)
            | PlatformError::Network(m)
            | PlatformError::RateLimit(m) => m,
        }
    }

    fn is_auth_related(&self) -> bool {
        matches!(
            self,
            PlatformError::Authentication(_) | PlatformError::SessionExpired(_)
        )
    }
}
