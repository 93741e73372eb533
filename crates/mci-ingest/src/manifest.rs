//! Per-run file manifest
//!
//! One [`TransferRecord`] per physical file destined for the derivative.
//! Records are grouped by the remote subfolder they live in, uploaded
//! per group and validated together.
//!
//! Validity is only ever derived from a remote listing. Uploading a file
//! says nothing about whether the store holds the right bytes.

use crate::api::endpoints::{content_file_url, normalize_subfolder};
use crate::api::types::{DirectoryListing, RemoteFile};
use crate::error::{IngestError, Result};
use mci_common::checksum::{self, Digest};
use mci_common::CommonError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What a file is to the store; drives subfolder and content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    Metadata,
    MetadataCompanion,
    Media,
    TextAnnotation,
}

impl FileCategory {
    pub const ALL: [FileCategory; 4] = [
        FileCategory::Metadata,
        FileCategory::MetadataCompanion,
        FileCategory::Media,
        FileCategory::TextAnnotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Metadata => "metadata",
            FileCategory::MetadataCompanion => "metadata-companion",
            FileCategory::Media => "media",
            FileCategory::TextAnnotation => "text-annotation",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileCategory::Media => "image/tiff",
            _ => "application/xml",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote subfolder per category, in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubfolderLayout {
    media: String,
    annotation: String,
}

impl SubfolderLayout {
    pub fn new(media: &str, annotation: &str) -> Self {
        Self {
            media: normalize_subfolder(media),
            annotation: normalize_subfolder(annotation),
        }
    }

    pub fn subfolder_for(&self, category: FileCategory) -> &str {
        match category {
            FileCategory::Metadata | FileCategory::MetadataCompanion => "",
            FileCategory::Media => &self.media,
            FileCategory::TextAnnotation => &self.annotation,
        }
    }
}

/// Outcome of the latest comparison against a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    /// No listing has been seen yet
    Pending,
    /// The latest listing did not contain the file
    Missing,
    /// Listed, but with a different (or no) checksum
    Mismatch,
    Match,
}

impl Verification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verification::Pending => "pending",
            Verification::Missing => "missing",
            Verification::Mismatch => "mismatch",
            Verification::Match => "match",
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    name: String,
    category: FileCategory,
    subfolder: String,
    local_path: PathBuf,
    local_size: u64,
    local_checksum: Digest,
    remote_checksum: Option<String>,
    remote_mime_type: Option<String>,
    remote_size: Option<u64>,
    remote_url: Option<String>,
    remote_modified: Option<String>,
    valid: bool,
    upload_attempts: u32,
    verification: Verification,
}

impl TransferRecord {
    pub fn new(
        name: impl Into<String>,
        category: FileCategory,
        subfolder: &str,
        local_path: impl Into<PathBuf>,
        local_size: u64,
        local_checksum: Digest,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            subfolder: normalize_subfolder(subfolder),
            local_path: local_path.into(),
            local_size,
            local_checksum,
            remote_checksum: None,
            remote_mime_type: None,
            remote_size: None,
            remote_url: None,
            remote_modified: None,
            valid: false,
            upload_attempts: 0,
            verification: Verification::Pending,
        }
    }

    /// Size and digest the file at `path`. Blocking; run off the async runtime.
    pub fn from_local(
        name: impl Into<String>,
        category: FileCategory,
        subfolder: &str,
        path: &Path,
    ) -> Result<Self> {
        let size = std::fs::metadata(path)
            .map_err(|e| IngestError::local_io(path, e))?
            .len();

        let checksum = checksum::digest(path).map_err(|e| match e {
            CommonError::Io(source) => IngestError::local_io(path, source),
            other => other.into(),
        })?;

        Ok(Self::new(name, category, subfolder, path, size, checksum))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> FileCategory {
        self.category
    }

    pub fn subfolder(&self) -> &str {
        &self.subfolder
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn local_size(&self) -> u64 {
        self.local_size
    }

    pub fn local_checksum(&self) -> &Digest {
        &self.local_checksum
    }

    pub fn remote_checksum(&self) -> Option<&str> {
        self.remote_checksum.as_deref()
    }

    pub fn remote_mime_type(&self) -> Option<&str> {
        self.remote_mime_type.as_deref()
    }

    pub fn remote_size(&self) -> Option<u64> {
        self.remote_size
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    pub fn remote_modified(&self) -> Option<&str> {
        self.remote_modified.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn upload_attempts(&self) -> u32 {
        self.upload_attempts
    }

    pub fn verification(&self) -> Verification {
        self.verification
    }

    /// Whether another upload round may include this record
    pub fn is_eligible(&self, max_tries: u32) -> bool {
        !self.valid && self.upload_attempts < max_tries
    }

    /// Count one round's upload attempt. Returns false, and leaves the
    /// counter alone, when the record is not eligible.
    pub fn record_upload_attempt(&mut self, max_tries: u32) -> bool {
        if !self.is_eligible(max_tries) {
            return false;
        }
        self.upload_attempts += 1;
        true
    }

    /// Take over what a listing reports for this file
    pub fn apply_remote(&mut self, remote: &RemoteFile, url: String) {
        self.remote_checksum = remote.md5.clone();
        self.remote_mime_type = remote.mime_type.clone();
        self.remote_size = remote.size;
        self.remote_modified = remote.modified.clone();
        self.remote_url = Some(url);

        self.valid = remote
            .md5
            .as_deref()
            .is_some_and(|md5| self.local_checksum.matches(md5));
        self.verification = if self.valid {
            Verification::Match
        } else {
            Verification::Mismatch
        };
    }

    /// The latest listing did not contain this file. Remote fields from an
    /// earlier listing are kept for the receipt.
    pub fn mark_missing(&mut self) {
        self.valid = false;
        self.verification = Verification::Missing;
    }
}

/// Counts from applying one listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub matched: usize,
    pub mismatched: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<TransferRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` unless its local path is already tracked.
    /// Returns whether the record was added.
    ///
    /// Listings are matched by name within a subfolder, so a second file
    /// claiming an occupied remote name is a configuration error.
    pub fn add(&mut self, record: TransferRecord) -> Result<bool> {
        if self.contains_path(record.local_path()) {
            return Ok(false);
        }

        if let Some(existing) = self
            .records
            .iter()
            .find(|r| r.name == record.name && r.subfolder == record.subfolder)
        {
            return Err(IngestError::config(format!(
                "'{}' and '{}' would both be stored as '{}{}'",
                existing.local_path.display(),
                record.local_path.display(),
                record.subfolder,
                record.name
            )));
        }

        self.records.push(record);
        Ok(true)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.local_path == path)
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&TransferRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut TransferRecord> {
        self.records.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all_valid(&self) -> bool {
        self.records.iter().all(|r| r.valid)
    }

    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.valid).count()
    }

    /// Indices of records the next upload round covers
    pub fn pending_uploads(&self, max_tries: u32) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_eligible(max_tries))
            .map(|(i, _)| i)
            .collect()
    }

    /// Distinct subfolders, in first-seen order
    pub fn subfolders_in_use(&self) -> Vec<String> {
        let mut folders: Vec<String> = Vec::new();
        for record in &self.records {
            if !folders.contains(&record.subfolder) {
                folders.push(record.subfolder.clone());
            }
        }
        folders
    }

    /// Update every record of `subfolder` from a fresh listing
    pub fn apply_listing(
        &mut self,
        container_location: &str,
        subfolder: &str,
        listing: &DirectoryListing,
    ) -> ListingSummary {
        let folder = normalize_subfolder(subfolder);
        let mut summary = ListingSummary::default();

        for record in self.records.iter_mut().filter(|r| r.subfolder == folder) {
            match listing.file(&record.name) {
                Some(remote) => {
                    let url = content_file_url(container_location, &folder, &record.name);
                    record.apply_remote(remote, url);
                    if record.valid {
                        summary.matched += 1;
                    } else {
                        summary.mismatched += 1;
                    }
                }
                None => {
                    record.mark_missing();
                    summary.missing += 1;
                }
            }
        }

        summary
    }

    /// Local bytes per category, every category present
    pub fn bytes_by_category(&self) -> BTreeMap<FileCategory, u64> {
        let mut totals: BTreeMap<FileCategory, u64> =
            FileCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for record in &self.records {
            *totals.entry(record.category).or_insert(0) += record.local_size;
        }
        totals
    }
}
