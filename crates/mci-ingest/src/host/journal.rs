//! Journal sinks

use crate::error::{IngestError, Result};
use crate::host::{JournalEntry, JournalSink};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

pub const JOURNAL_FILENAME: &str = "journal.jsonl";

/// One JSON object per line in `<dir>/journal.jsonl`
pub struct JsonlJournal {
    dir: PathBuf,
}

#[derive(Serialize)]
struct JournalLine<'a> {
    job: &'a str,
    #[serde(flatten)]
    entry: &'a JournalEntry,
}

impl JsonlJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILENAME)
    }
}

#[async_trait]
impl JournalSink for JsonlJournal {
    async fn append(&self, job: &str, entry: JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(&JournalLine { job, entry: &entry })
            .map_err(|e| IngestError::Serialization(e.to_string()))?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            IngestError::host(format!("Cannot create '{}': {}", self.dir.display(), e))
        })?;

        let path = self.path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| IngestError::host(format!("Cannot open '{}': {}", path.display(), e)))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| IngestError::host(format!("Cannot append to '{}': {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| IngestError::host(format!("Cannot append to '{}': {}", path.display(), e)))?;

        Ok(())
    }
}

/// Keeps entries in memory, in append order
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<(String, JournalEntry)>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, JournalEntry)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JournalSink for MemoryJournal {
    async fn append(&self, job: &str, entry: JournalEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| IngestError::host(format!("Failed to acquire journal lock: {}", e)))?
            .push((job.to_string(), entry));
        Ok(())
    }
}
