//! Error types for podconsole-catalog
//!
//! Ingestion is fail-soft: source and derivation errors are recorded in the
//! ingest report instead of aborting a pass. Store errors are fatal for the
//! operation that hit them.

use thiserror::Error;

/// Catalog pipeline error type
#[derive(Debug, Error)]
pub enum Error {
    /// One catalog source could not be fetched or decoded
    #[error("catalog source {source_name} failed: {reason}")]
    Source {
        /// Catalog source name
        source_name: String,
        /// Underlying failure
        reason: String,
    },

    /// A catalog item could not be derived for a package
    #[error("could not derive catalog item for {package}: {reason}")]
    Derivation {
        /// Fully-qualified package id
        package: String,
        /// Underlying failure
        reason: String,
    },

    /// A decoded object did not match the expected catalog schema
    #[error("invalid catalog object: {0}")]
    InvalidObject(String),

    /// A JSON-Lines line exceeded the configured length
    #[error("line of {len} bytes exceeds the {max} byte limit")]
    LineTooLong {
        /// Bytes buffered when the limit was hit
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// SQLite database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization / deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// General internal error
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Create a source error
    #[must_use]
    pub fn source_failed(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Source {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a derivation error
    #[must_use]
    pub fn derivation(package: impl Into<String>, reason: impl ToString) -> Self {
        Self::Derivation {
            package: package.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if a later pass may succeed without intervention
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::Http(_) | Self::Io(_))
    }

    /// Get a stable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Source { .. } => "ingest_source_error",
            Self::Derivation { .. } => "derivation_error",
            Self::InvalidObject(_) => "invalid_object",
            Self::LineTooLong { .. } => "line_too_long",
            Self::Database(_) => "database_error",
            Self::Serialization(_) => "serialization_error",
            Self::Http(_) => "http_error",
            Self::Io(_) => "io_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;
