//! Error types shared across Sieve crates.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the Sieve error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for configuration, IO and serialization failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::Config("bad interval".into()).with_context("loading config");
        assert!(matches!(err, Error::WithContext { .. }));
        assert_eq!(err.to_string(), "loading config: Configuration error: bad interval");
    }

    #[test]
    fn test_validation_error_becomes_config_error() {
        let err: Error = ValidationError::MissingField {
            field: "output.dir".into(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("output.dir"));
    }

    #[test]
    fn test_result_ext_wraps_io() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let err = res.context("reading criteria.json").unwrap_err();
        assert!(err.to_string().starts_with("reading criteria.json"));
    }
}
