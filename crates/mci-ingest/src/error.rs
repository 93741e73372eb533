//! Error types for the ingest engine
//!
//! The variants mirror the failure classes the reconciliation loop has to
//! tell apart. A checksum mismatch is a record state, not an error.

use mci_common::CommonError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The local export produced nothing usable
    #[error("Metadata export failed: {0}")]
    Export(String),

    /// Identifier property missing, stylesheet unavailable, or transform engine error
    #[error("Metadata transform failed: {0}")]
    Transform(String),

    /// The store answered with a non-2xx status
    #[error("Remote store rejected {operation}: HTTP {status} - {body}")]
    RemoteRejected {
        operation: String,
        status: u16,
        body: String,
    },

    /// A 2xx create response carried no usable `Location` header
    #[error("Remote store returned no location for {0}")]
    MissingLocation(String),

    /// Connection, TLS or timeout failure before a response arrived
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// A listing body that is not a readable directory document
    #[error("Failed to parse remote listing: {0}")]
    Parse(String),

    /// Source file vanished or is unreadable
    #[error("Local file '{}' unavailable: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Receipt, journal or property store failure
    #[error("Host store error: {0}")]
    Host(String),

    #[error("Receipt serialization failed: {0}")]
    Serialization(String),
}

impl IngestError {
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    pub fn rejected(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RemoteRejected {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// `MissingLocation` counts as a rejection
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RemoteRejected { .. } | Self::MissingLocation(_))
    }

    /// Errors that abort a run wherever they occur
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Failures the upload and verify phases may retry within the round budget
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteRejected { .. } | Self::Transport { .. } | Self::Parse(_)
        )
    }
}

impl From<CommonError> for IngestError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config(msg) => Self::Config(msg),
            other => Self::Host(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_location_is_rejection() {
        assert!(IngestError::MissingLocation("volume".into()).is_rejection());
        assert!(IngestError::rejected("upload", 500, "boom").is_rejection());
        assert!(!IngestError::transport("upload", "timed out").is_rejection());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(IngestError::transport("list", "connection reset").is_retryable());
        assert!(IngestError::rejected("upload", 503, "").is_retryable());
        assert!(!IngestError::export("nothing exported").is_retryable());
        assert!(!IngestError::local_io("/tmp/x", std::io::ErrorKind::NotFound.into())
            .is_retryable());
        assert!(IngestError::MissingLocation("derivative".into()).is_fatal());
        assert!(!IngestError::Parse("truncated".into()).is_fatal());
    }

    #[test]
    fn test_rejected_message_carries_status_and_body() {
        let err = IngestError::rejected("creation of volume", 409, "already exists");
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("already exists"));
    }
}
