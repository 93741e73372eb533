//! Collaborators provided by the hosting workflow system
//!
//! The engine only depends on these traits. Default implementations work
//! on plain directories so the binary can run outside a workflow host.

pub mod enumerate;
pub mod export;
pub mod journal;
pub mod properties;
pub mod receipts;
pub mod transform;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use enumerate::DirectoryEnumerator;
pub use export::PreExportedMetadata;
pub use journal::{JsonlJournal, MemoryJournal};
pub use properties::{JsonPropertyStore, MemoryPropertyStore};
pub use receipts::{FileReceiptStore, MemoryReceiptStore};
pub use transform::XsltProcTransformer;

/// Result of the metadata export for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMetadata {
    pub document: PathBuf,
    /// Anchor document of multi-volume works, when the export produced one
    pub companion: Option<PathBuf>,
}

#[async_trait]
pub trait MetadataExporter: Send + Sync {
    async fn export(&self, job: &str) -> Result<ExportedMetadata>;
}

#[async_trait]
pub trait DocumentTransformer: Send + Sync {
    /// Transform `document` into the store's object schema, passing
    /// `parent_id` as the `parentID` parameter
    async fn transform(&self, document: &Path, parent_id: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    Media,
    TextAnnotation,
}

#[async_trait]
pub trait FileEnumerator: Send + Sync {
    async fn list(&self, role: FileRole) -> Result<Vec<PathBuf>>;
}

/// Key/value facts attached to a job
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Value of `name`, matched case-insensitively
    async fn get(&self, job: &str, name: &str) -> Result<Option<String>>;

    async fn set(&self, job: &str, name: &str, value: &str) -> Result<()>;
}

/// Append-only journal of a job
#[async_trait]
pub trait JournalSink: Send + Sync {
    async fn append(&self, job: &str, entry: JournalEntry) -> Result<()>;
}

/// Durable home of run receipts
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Store `content` under `filename`, returning where it went.
    /// An existing receipt is never overwritten.
    async fn write(&self, job: &str, filename: &str, content: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalKind {
    Info,
    Error,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: JournalKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl JournalEntry {
    pub fn new(kind: JournalKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            filename: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(JournalKind::Error, message)
    }

    /// Entry pointing at a file the run produced
    pub fn file(message: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::new(JournalKind::File, message)
        }
    }
}
