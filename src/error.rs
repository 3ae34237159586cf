use std::io;
use thiserror::Error;

/// Coordination errors shared by the store, registry and worker layers
#[derive(Error, Debug)]
pub enum CoordError {
    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Record errors
    #[error("Unknown machine kind '{kind}' in record: {record}")]
    UnknownKind { kind: String, record: String },

    #[error("Malformed record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    // Registry errors
    #[error("Machine kind already registered: {kind}")]
    KindAlreadyRegistered { kind: String },

    // Configuration errors
    #[error("Configuration invalid: {0}")]
    InvalidConfiguration(String),
}

impl CoordError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a malformed-record error
    pub fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error concerns a single record rather than the store.
    ///
    /// Skippable errors are logged and the offending record is left behind;
    /// everything else aborts the operation that hit it.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::UnknownKind { .. } | Self::MalformedRecord { .. }
        )
    }
}

/// Result type alias for CoordError
pub type Result<T> = std::result::Result<T, CoordError>;
