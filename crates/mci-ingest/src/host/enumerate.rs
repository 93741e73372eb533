//! Local files of a job, one directory per role

use crate::error::{IngestError, Result};
use crate::host::{FileEnumerator, FileRole};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct DirectoryEnumerator {
    media_dir: Option<PathBuf>,
    annotation_dir: Option<PathBuf>,
}

impl DirectoryEnumerator {
    pub fn new(media_dir: Option<PathBuf>, annotation_dir: Option<PathBuf>) -> Self {
        Self {
            media_dir,
            annotation_dir,
        }
    }

    fn dir_for(&self, role: FileRole) -> Option<&PathBuf> {
        match role {
            FileRole::Media => self.media_dir.as_ref(),
            FileRole::TextAnnotation => self.annotation_dir.as_ref(),
        }
    }
}

#[async_trait]
impl FileEnumerator for DirectoryEnumerator {
    /// Regular files of the role's directory sorted by path. An absent
    /// directory has no files.
    async fn list(&self, role: FileRole) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.dir_for(role) else {
            return Ok(Vec::new());
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IngestError::local_io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IngestError::local_io(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| IngestError::local_io(entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}
