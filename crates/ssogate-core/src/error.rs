//! Error types for ssogate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or incomplete configuration; never retried
    Configuration,
    /// Directory unreachable, TLS failure or service account rejected
    Connectivity,
    /// The end user could not be authenticated
    Authentication,
    /// The session cookie could not be read or written
    Session,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Invalid directory URL: {0}")]
    InvalidDirectoryUrl(String),

    #[error("Unknown directory URL scheme: {0}")]
    UnknownScheme(String),

    #[error("Invalid directory host:port: {0}")]
    InvalidHostPort(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // Connectivity Errors
    #[error("Directory connection failed: {0}")]
    Connection(String),

    #[error("Service account bind failed: {0}")]
    ServiceBind(String),

    #[error("Directory operation failed: {0}")]
    Directory(String),

    // Authentication Errors
    /// Covers unknown users, ambiguous users and wrong passwords alike.
    #[error("User does not exist, is not unique, or the password is incorrect")]
    InvalidCredentials,

    // Session Errors
    #[error("Failed to decode session: {0}")]
    SessionDecode(String),

    #[error("Failed to encode session: {0}")]
    SessionEncode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidDirectoryUrl(_)
            | Error::UnknownScheme(_)
            | Error::InvalidHostPort(_)
            | Error::Config(_) => ErrorCategory::Configuration,

            Error::Connection(_) | Error::ServiceBind(_) | Error::Directory(_) => {
                ErrorCategory::Connectivity
            }

            Error::InvalidCredentials => ErrorCategory::Authentication,

            Error::SessionDecode(_) | Error::SessionEncode(_) => ErrorCategory::Session,

            Error::Io(_) | Error::Other(_) => ErrorCategory::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidDirectoryUrl(_) => "InvalidDirectoryUrl",
            Error::UnknownScheme(_) => "UnknownScheme",
            Error::InvalidHostPort(_) => "InvalidHostPort",
            Error::Config(_) => "InvalidConfiguration",
            Error::Connection(_) => "DirectoryUnavailable",
            Error::ServiceBind(_) => "DirectoryUnavailable",
            Error::Directory(_) => "DirectoryError",
            Error::InvalidCredentials => "InvalidCredentials",
            Error::SessionDecode(_) => "InvalidSession",
            Error::SessionEncode(_) => "SessionError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Authentication => 401,
            ErrorCategory::Session => match self {
                Error::SessionDecode(_) => 400,
                _ => 500,
            },
            ErrorCategory::Connectivity => 502,
            ErrorCategory::Configuration | ErrorCategory::Internal => 500,
        }
    }

    /// Message safe to hand to an end user.
    ///
    /// Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Authentication => self.to_string(),
            ErrorCategory::Session => match self {
                Error::SessionEncode(_) => "Session could not be saved".to_string(),
                _ => "Invalid session".to_string(),
            },
            ErrorCategory::Connectivity => "The directory service is unavailable".to_string(),
            ErrorCategory::Configuration | ErrorCategory::Internal => {
                "Internal server error".to_string()
            }
        }
    }
}
