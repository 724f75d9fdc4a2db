/*
 * Error types for lakehouse storage audits.
 *
 * Errors fall into two scopes:
 * - Run-scoped: configuration problems, fatal before any I/O happens
 * - Table-scoped: listing, manifest and data-file problems, recorded
 *   against one table while the rest of the run continues
 *
 * Retryability is tracked separately so the listing loop can back off on
 * transient object-store failures.
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Listing error: {0}")]
    Listing(String),

    #[error("Manifest read error: {0}")]
    ManifestRead(String),

    #[error("No data files found under table prefix '{table}'")]
    NoDataFiles { table: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Iceberg error: {0}")]
    Iceberg(#[from] iceberg::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout: operation exceeded {0:?}")]
    Timeout(Duration),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Audit cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Stable classification of a per-table failure, as it appears in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Listing,
    ManifestRead,
    NoDataFiles,
    Cancelled,
    Other,
}

impl AuditError {
    /// Returns true if this error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::Storage(_) | AuditError::Timeout(_) | AuditError::ResourceExhausted(_)
        )
    }

    /// Returns a suggested retry delay for this error type.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            AuditError::ResourceExhausted(_) => Some(Duration::from_secs(2)),
            AuditError::Timeout(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Returns true if the error comes from the run's configuration, so every
    /// table sharing that configuration fails the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuditError::Configuration(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AuditError::Configuration(_) => FailureKind::Configuration,
            AuditError::Listing(_)
            | AuditError::Storage(_)
            | AuditError::Timeout(_)
            | AuditError::ResourceExhausted(_) => FailureKind::Listing,
            AuditError::ManifestRead(_) | AuditError::Iceberg(_) => FailureKind::ManifestRead,
            AuditError::NoDataFiles { .. } => FailureKind::NoDataFiles,
            AuditError::Cancelled => FailureKind::Cancelled,
            AuditError::Serialization(_) | AuditError::Unexpected(_) => FailureKind::Other,
        }
    }

    /// Wraps this error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match self {
            AuditError::Configuration(msg) => AuditError::Configuration(format!("{}: {}", ctx, msg)),
            AuditError::Listing(msg) => AuditError::Listing(format!("{}: {}", ctx, msg)),
            AuditError::ManifestRead(msg) => AuditError::ManifestRead(format!("{}: {}", ctx, msg)),
            AuditError::Storage(msg) => AuditError::Storage(format!("{}: {}", ctx, msg)),
            AuditError::Serialization(msg) => {
                AuditError::Serialization(format!("{}: {}", ctx, msg))
            }
            AuditError::ResourceExhausted(msg) => {
                AuditError::ResourceExhausted(format!("{}: {}", ctx, msg))
            }
            AuditError::Unexpected(msg) => AuditError::Unexpected(format!("{}: {}", ctx, msg)),
            // Iceberg failures always surface while reading table metadata
            e @ AuditError::Iceberg(_) => AuditError::ManifestRead(format!("{}: {}", ctx, e)),
            e @ (AuditError::NoDataFiles { .. } | AuditError::Timeout(_) | AuditError::Cancelled) => e,
        }
    }
}

impl From<opendal::Error> for AuditError {
    fn from(e: opendal::Error) -> Self {
        if e.is_temporary() {
            AuditError::Storage(e.to_string())
        } else {
            AuditError::Listing(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        AuditError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context lazily (only evaluated on error).
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
