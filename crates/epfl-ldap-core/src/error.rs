//! Error types for directory lookups.
//!
//! Lookups fail in three ways: the queried value is absent from the directory
//! (`NotFound`), the directory could not be reached or answered with an error
//! (`Directory`, `Timeout`), or the workspace was configured incompletely
//! (`ConfigError`).

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The queried value has no counterpart in the directory
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport or LDAP result-code failure
    #[error("Directory error: {message}")]
    Directory {
        /// Error message reported by the LDAP client
        message: String,
    },

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// An entry's distinguished name does not have the expected tree shape
    #[error("Unsupported directory shape: {0}")]
    UnsupportedDirectoryShape(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("The unit with id '42' was not found".to_string());
        assert_eq!(
            err.to_string(),
            "Not found: The unit with id '42' was not found"
        );

        let err = Error::Directory {
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Directory error: connection refused");
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }
}
