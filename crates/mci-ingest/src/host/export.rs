//! Metadata export produced ahead of the run
//!
//! The workflow host writes `<job>_mets.xml` (and for volumes of a
//! multi-volume work `<job>_mets_anchor.xml`) into a known directory.

use crate::config::companion_name;
use crate::error::{IngestError, Result};
use crate::host::{ExportedMetadata, MetadataExporter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct PreExportedMetadata {
    dir: PathBuf,
}

impl PreExportedMetadata {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn document_path(&self, job: &str) -> PathBuf {
        self.dir.join(format!("{}_mets.xml", job))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl MetadataExporter for PreExportedMetadata {
    async fn export(&self, job: &str) -> Result<ExportedMetadata> {
        let document = self.document_path(job);
        if !is_file(&document).await {
            return Err(IngestError::export(format!(
                "Export to file '{}' was not successful",
                document.display()
            )));
        }

        let companion = document
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| document.with_file_name(companion_name(name)));

        let companion = match companion {
            Some(path) if is_file(&path).await => Some(path),
            _ => None,
        };

        debug!(
            document = %document.display(),
            has_companion = companion.is_some(),
            "Metadata export located"
        );

        Ok(ExportedMetadata {
            document,
            companion,
        })
    }
}
