//! Error types for directory operations.
//!
//! Every fallible step of the client protocol and the emulator returns [`Result`]. Errors are
//! grouped into the classes reported by [`Error::kind`] so callers can tell a wrong password
//! apart from an unavailable directory.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No configured endpoint accepted a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The directory answered with an unexpected result code
    #[error("Directory protocol error {code}: {message}")]
    Protocol {
        /// LDAP result code
        code: u32,
        /// Diagnostic message returned by the directory
        message: String,
    },

    /// Bind rejected the supplied DN/password pair
    #[error("Invalid Credentials")]
    InvalidCredentials,

    /// The bound identity may not perform the operation
    #[error("Insufficient Access Rights: {0}")]
    InsufficientAccessRights(String),

    /// The bind DN is not a distinguished name
    #[error("Invalid Dn Syntax: {0}")]
    InvalidDnSyntax(String),

    /// The searched base object does not exist
    #[error("No Such Object: {0}")]
    NoSuchObject(String),

    /// A login search did not resolve to exactly one record
    #[error("No unique identity to bind, found {0} users")]
    NoUniqueIdentity(usize),

    /// The located record carries neither a `distinguishedName` nor an object name
    #[error("No distinguishedName/objectName attribute found")]
    MissingDistinguishedName,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error classes used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, timeout and protocol failures
    Transport,
    /// Rejected bind credentials or missing rights
    Credential,
    /// Uniqueness or identifying-attribute violations
    Shape,
    /// Normal empty-result conditions
    Absence,
    /// Malformed configuration or caller input
    Configuration,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InsufficientAccessRights(_) => "INSUFFICIENT_ACCESS_RIGHTS",
            Self::InvalidDnSyntax(_) => "INVALID_DN_SYNTAX",
            Self::NoSuchObject(_) => "NO_SUCH_OBJECT",
            Self::NoUniqueIdentity(_) => "NO_UNIQUE_IDENTITY",
            Self::MissingDistinguishedName => "MISSING_DISTINGUISHED_NAME",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Returns the class this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout(_) | Self::Protocol { .. } => {
                ErrorKind::Transport
            }
            Self::InvalidCredentials
            | Self::InsufficientAccessRights(_)
            | Self::InvalidDnSyntax(_) => ErrorKind::Credential,
            Self::NoUniqueIdentity(_) | Self::MissingDistinguishedName => ErrorKind::Shape,
            Self::NoSuchObject(_) => ErrorKind::Absence,
            Self::ConfigError(_) | Self::InvalidRequest(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if the error represents an empty result rather than a failure.
    #[must_use]
    pub const fn is_absence(&self) -> bool {
        matches!(self.kind(), ErrorKind::Absence)
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Configuration
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid endpoint: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(format!("Invalid directory configuration: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConnectionFailed("test".to_string()).error_code(),
            "CONNECTION_FAILED"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::Protocol {
                code: 80,
                message: "other".to_string()
            }
            .error_code(),
            "PROTOCOL_ERROR"
        );
        assert_eq!(Error::InvalidCredentials.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(
            Error::InsufficientAccessRights("test".to_string()).error_code(),
            "INSUFFICIENT_ACCESS_RIGHTS"
        );
        assert_eq!(
            Error::NoSuchObject("test".to_string()).error_code(),
            "NO_SUCH_OBJECT"
        );
        assert_eq!(Error::NoUniqueIdentity(2).error_code(), "NO_UNIQUE_IDENTITY");
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NoUniqueIdentity(0).to_string(),
            "No unique identity to bind, found 0 users"
        );
        assert_eq!(
            Error::NoUniqueIdentity(2).to_string(),
            "No unique identity to bind, found 2 users"
        );
        assert_eq!(
            Error::MissingDistinguishedName.to_string(),
            "No distinguishedName/objectName attribute found"
        );
        assert_eq!(Error::InvalidCredentials.to_string(), "Invalid Credentials");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::Timeout("bind".to_string()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(Error::InvalidCredentials.kind(), ErrorKind::Credential);
        assert_eq!(Error::NoUniqueIdentity(3).kind(), ErrorKind::Shape);
        assert!(Error::NoSuchObject("dc=example".to_string()).is_absence());
        assert_eq!(
            Error::ConfigError("bad".to_string()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConnectionFailed("test".to_string()).should_log());
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(!Error::InvalidCredentials.should_log());
        assert!(!Error::NoUniqueIdentity(0).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }
}
