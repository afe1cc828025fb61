//! Error taxonomy.
//!
//! Anything scoped to a single (model, file) pair is downgraded to a
//! recorded failure; only configuration and invariant errors abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API credential not found: set the {0} environment variable")]
    MissingCredential(String),

    #[error("no models configured")]
    NoModels,

    #[error("invalid release pattern '{pattern}': {source}")]
    InvalidReleasePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// A file that could not be read; the file is skipped.
#[derive(Debug, Error)]
#[error("failed to read {}: {source}", path.display())]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A failed model call, recorded on the model result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("timeout")]
    Timeout,

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,
}

impl CallError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Timeout | CallError::RateLimited | CallError::Network(_) => true,
            CallError::Http { status, .. } => *status >= 500,
            CallError::InvalidResponse(_) | CallError::Cancelled => false,
        }
    }
}

/// Model output that could not be turned into smell records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse model response: {reason}")]
pub struct ParseFailure {
    pub reason: String,
    /// The unparsed text, kept for inspection.
    pub raw: String,
}

/// Broken invariant during aggregation. Always fatal.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("result for unconfigured model '{model}' on {file}")]
    UnknownModel { model: String, file: String },

    #[error("smell count mismatch: per-model totals {tallied}, records {expected}")]
    CountMismatch { tallied: usize, expected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_displays_as_timeout() {
        assert_eq!(CallError::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CallError::Timeout.is_transient());
        assert!(CallError::RateLimited.is_transient());
        assert!(CallError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!CallError::Http {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!CallError::Cancelled.is_transient());
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let e = ConfigError::MissingCredential("HF_TOKEN".to_string());
        assert!(e.to_string().contains("HF_TOKEN"));
    }
}
