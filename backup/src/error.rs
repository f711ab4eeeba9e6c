//! Error types for the backup tool

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials, paths or settings; nothing remote was attempted
    Configuration,
    /// The remote command failed or could not be observed to succeed
    RemoteExecution,
    /// The downloaded archive did not validate
    Integrity,
    /// Local I/O or other unexpected failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::RemoteExecution => "remote_execution",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Main error type for the backup tool
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors (1000-1999)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Local destination directory '{0}' does not exist")]
    DestinationNotFound(String),

    #[error("Local destination '{0}' is not a directory")]
    NotADirectory(String),

    // Secret errors (2000-2999)
    #[error("Secret provider is not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Missing required secret field(s): {0}")]
    MissingSecretField(String),

    #[error("Secret provider error: {0}")]
    SecretProvider(String),

    // Remote execution errors (3000-3999)
    #[error("SSH/tar command failed ({code}): {reason}")]
    RemoteCommandFailed { code: i32, reason: String },

    // Integrity errors (4000-4999)
    #[error("gzip integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    // Internal errors (9000-9999)
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidConfig(_) => 1001,
            Error::InvalidParameter(_) => 1002,
            Error::DestinationNotFound(_) => 1003,
            Error::NotADirectory(_) => 1004,

            Error::Unauthenticated(_) => 2001,
            Error::MissingSecretField(_) => 2002,
            Error::SecretProvider(_) => 2003,

            Error::RemoteCommandFailed { .. } => 3001,

            Error::IntegrityCheckFailed(_) => 4001,

            Error::Io(_) => 9001,
            Error::Internal(_) => 9002,
        }
    }

    /// Get the failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidParameter(_)
            | Error::DestinationNotFound(_)
            | Error::NotADirectory(_)
            | Error::Unauthenticated(_)
            | Error::MissingSecretField(_)
            | Error::SecretProvider(_) => ErrorKind::Configuration,

            Error::RemoteCommandFailed { .. } => ErrorKind::RemoteExecution,

            Error::IntegrityCheckFailed(_) => ErrorKind::Integrity,

            Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SecretProvider(format!("unexpected response: {}", err))
    }
}
