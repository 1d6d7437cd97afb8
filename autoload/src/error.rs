//! Error types for the auto-load pipeline

use thiserror::Error;

/// Failure to obtain the contents of one import source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Nothing exists at the given path or URL
    #[error("Source not found: {0}")]
    NotFound(String),

    /// The source exists but could not be read
    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The source path could not be turned into a location
    #[error("Invalid source location {path}: {reason}")]
    InvalidLocation { path: String, reason: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let path = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        SourceError::Unreadable {
            path,
            reason: err.to_string(),
        }
    }
}

/// Main error type for the auto-load pipeline
#[derive(Debug, Error)]
pub enum AutoLoadError {
    /// A file or URL could not be read
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    /// The normalizer received a format tag it does not recognize
    #[error("Unsupported import format: {0}")]
    UnsupportedFormat(String),

    /// Content parsed but is not valid for its declared format
    #[error("Malformed {format} document: {reason}")]
    MalformedDocument { format: String, reason: String },

    /// The auto-load config could not be resolved
    #[error("Config error: {0}")]
    Config(String),

    /// The readiness service never reported initialized
    #[error("Readiness service not initialized after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    /// The readiness service answered with an unexpected response
    #[error("Cache service error: {0}")]
    Cache(String),

    /// The workspace store rejected the collection batch
    #[error("Commit failed: {0}")]
    CommitFailure(String),
}

impl AutoLoadError {
    /// Shorthand for a malformed document error
    pub fn malformed(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            format: format.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole auto-load run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ReadinessTimeout { .. }
                | Self::Cache(_)
                | Self::CommitFailure(_)
        )
    }
}

/// Result type for auto-load operations
pub type Result<T> = std::result::Result<T, AutoLoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AutoLoadError::ReadinessTimeout { attempts: 30 }.is_fatal());
        assert!(AutoLoadError::CommitFailure("rejected".into()).is_fatal());
        assert!(!AutoLoadError::UnsupportedFormat("har".into()).is_fatal());
        assert!(!AutoLoadError::malformed("Postman", "no items").is_fatal());
        assert!(!AutoLoadError::from(SourceError::NotFound("a.json".into())).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = AutoLoadError::malformed("OpenAPI", "missing paths");
        assert_eq!(err.to_string(), "Malformed OpenAPI document: missing paths");

        let err = AutoLoadError::ReadinessTimeout { attempts: 30 };
        assert_eq!(
            err.to_string(),
            "Readiness service not initialized after 30 attempts"
        );
    }
}
