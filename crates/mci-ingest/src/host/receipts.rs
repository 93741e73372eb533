//! Receipt stores

use crate::error::{IngestError, Result};
use crate::host::ReceiptStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Writes receipts as files into the job's journal folder
pub struct FileReceiptStore {
    dir: PathBuf,
}

impl FileReceiptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReceiptStore for FileReceiptStore {
    async fn write(&self, _job: &str, filename: &str, content: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            IngestError::host(format!("Cannot create '{}': {}", self.dir.display(), e))
        })?;

        let path = self.dir.join(filename);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                IngestError::host(format!("Cannot create receipt '{}': {}", path.display(), e))
            })?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| IngestError::host(format!("Cannot write '{}': {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| IngestError::host(format!("Cannot write '{}': {}", path.display(), e)))?;

        Ok(path.display().to_string())
    }
}

/// Keeps receipts in memory, keyed by filename
#[derive(Default)]
pub struct MemoryReceiptStore {
    receipts: Mutex<BTreeMap<String, String>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipts(&self) -> BTreeMap<String, String> {
        self.receipts
            .lock()
            .map(|receipts| receipts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn write(&self, _job: &str, filename: &str, content: &str) -> Result<String> {
        let mut receipts = self
            .receipts
            .lock()
            .map_err(|e| IngestError::host(format!("Failed to acquire receipt lock: {}", e)))?;

        if receipts.contains_key(filename) {
            return Err(IngestError::host(format!(
                "Receipt '{}' already exists",
                filename
            )));
        }
        receipts.insert(filename.to_string(), content.to_string());
        Ok(format!("memory://receipts/{}", filename))
    }
}
