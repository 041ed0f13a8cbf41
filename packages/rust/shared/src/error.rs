//! Error types for Docent.
//!
//! Library crates use [`DocentError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::StageKind;

/// Top-level error type for all Docent operations.
#[derive(Debug, thiserror::Error)]
pub enum DocentError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The document could not be opened or fetched at all.
    #[error("source unavailable: {handle}: {reason}")]
    SourceUnavailable { handle: String, reason: String },

    /// A page or section could not be decoded. Degrades the extraction, never fatal on its own.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// A preprocessing stage failed; nothing was cached.
    #[error("preprocessing failed at {stage} stage: {cause}")]
    Preprocessing {
        stage: StageKind,
        #[source]
        cause: Box<DocentError>,
    },

    /// The QnA stage failed; the cached analysis is still valid.
    #[error("answer failed: {cause}")]
    Answer {
        #[source]
        cause: Box<DocentError>,
    },

    /// Network/HTTP error talking to a stage backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// The stage backend refused the request for rate limiting.
    #[error("rate limited{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The stage backend did not answer in time.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The stage backend answered with something unusable.
    #[error("malformed output: {0}")]
    MalformedOutput(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty question, empty handle, ...).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocentError>;

impl DocentError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a source-unavailable error for a document handle.
    pub fn source_unavailable(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attribute a failure to a preprocessing stage.
    pub fn preprocessing(stage: StageKind, cause: DocentError) -> Self {
        Self::Preprocessing {
            stage,
            cause: Box::new(cause),
        }
    }

    /// Wrap a failure of the question-answering step.
    pub fn answer(cause: DocentError) -> Self {
        Self::Answer {
            cause: Box::new(cause),
        }
    }

    /// Whether a stage backend may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocentError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = DocentError::validation("question must not be empty");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn preprocessing_error_names_the_stage() {
        let err = DocentError::preprocessing(StageKind::Critic, DocentError::Timeout { secs: 120 });
        assert_eq!(
            err.to_string(),
            "preprocessing failed at Critic stage: timed out after 120s"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn rate_limited_display() {
        let err = DocentError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 7s)");
        let err = DocentError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn retryable_classification() {
        assert!(DocentError::Transport("reset".into()).is_retryable());
        assert!(DocentError::Timeout { secs: 1 }.is_retryable());
        assert!(!DocentError::MalformedOutput("no choices".into()).is_retryable());
        assert!(!DocentError::validation("x").is_retryable());
    }
}
