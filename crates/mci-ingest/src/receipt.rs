//! The run receipt
//!
//! [`RunOutcome`] is created when a run starts, mutated while it proceeds
//! and rendered once at the end as an XML document:
//!
//! ```xml
//! <receipt>
//!   <begin>2024-05-02-101112345</begin>
//!   <end>2024-05-02-101530012</end>
//!   <status>FINISHED</status>
//!   <details>Ingest finished successfully</details>
//!   <volume>https://repo.example.org/api/v2/objects/jportal_jpvolume_00003142</volume>
//!   <derivative>.../derivates/jportal_derivate_00002172</derivative>
//!   <files>
//!     <file name="00000001.tif" category="media" valid="true" attempts="1" verification="match">
//!       <localPath>/data/images/00000001.tif</localPath>
//!       ...
//!     </file>
//!   </files>
//! </receipt>
//! ```
//!
//! Empty fields are left out.

use crate::error::{IngestError, Result};
use crate::manifest::{Manifest, TransferRecord};
use chrono::{Local, NaiveDateTime};
use quick_xml::se::Serializer;
use serde::Serialize;
use std::fmt;

/// Receipt timestamp format, millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    New,
    Started,
    Finished,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::New => "NEW",
            RunStatus::Started => "STARTED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: RunStatus,
    pub message: Option<String>,
    pub parent_location: Option<String>,
    pub derivative_location: Option<String>,
    pub manifest: Manifest,
}

impl Default for RunOutcome {
    fn default() -> Self {
        Self {
            started_at: Local::now().naive_local(),
            finished_at: None,
            status: RunStatus::New,
            message: None,
            parent_location: None,
            derivative_location: None,
            manifest: Manifest::new(),
        }
    }
}

impl RunOutcome {
    /// Outcome of a run starting now
    pub fn start() -> Self {
        Self {
            status: RunStatus::Started,
            ..Self::default()
        }
    }

    /// Stamp the end time and final status
    pub fn finish(&mut self, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        self.finished_at = Some(Local::now().naive_local());
        self.status = status;
        self.message = (!message.is_empty()).then_some(message);
    }

    /// `ingest-receipt-<end>.xml`, once the outcome is finished
    pub fn receipt_filename(&self) -> Option<String> {
        self.finished_at
            .map(|end| format!("ingest-receipt-{}.xml", end.format(TIMESTAMP_FORMAT)))
    }

    pub fn to_xml(&self) -> Result<String> {
        let document = ReceiptDocument::from(self);

        let mut buffer = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let mut serializer = Serializer::with_root(&mut buffer, Some("receipt"))
            .map_err(|e| IngestError::Serialization(e.to_string()))?;
        serializer.indent(' ', 2);
        document
            .serialize(serializer)
            .map_err(|e| IngestError::Serialization(e.to_string()))?;

        buffer.push('\n');
        Ok(buffer)
    }
}

fn timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Serialize)]
struct ReceiptDocument<'a> {
    begin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    derivative: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<FileList<'a>>,
}

#[derive(Serialize)]
struct FileList<'a> {
    file: Vec<FileEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry<'a> {
    #[serde(rename = "@name")]
    name: &'a str,
    #[serde(rename = "@category")]
    category: &'static str,
    #[serde(rename = "@valid")]
    valid: bool,
    #[serde(rename = "@attempts")]
    attempts: u32,
    #[serde(rename = "@verification")]
    verification: &'static str,
    local_path: String,
    local_size: u64,
    local_checksum: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_checksum: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_modified: Option<&'a str>,
}

impl<'a> From<&'a TransferRecord> for FileEntry<'a> {
    fn from(record: &'a TransferRecord) -> Self {
        Self {
            name: record.name(),
            category: record.category().as_str(),
            valid: record.is_valid(),
            attempts: record.upload_attempts(),
            verification: record.verification().as_str(),
            local_path: record.local_path().display().to_string(),
            local_size: record.local_size(),
            local_checksum: record.local_checksum().as_str(),
            remote_checksum: record.remote_checksum(),
            remote_mime_type: record.remote_mime_type(),
            remote_size: record.remote_size(),
            remote_url: record.remote_url(),
            remote_modified: record.remote_modified(),
        }
    }
}

impl<'a> From<&'a RunOutcome> for ReceiptDocument<'a> {
    fn from(outcome: &'a RunOutcome) -> Self {
        let files: Vec<FileEntry<'a>> =
            outcome.manifest.records().iter().map(FileEntry::from).collect();

        Self {
            begin: timestamp(&outcome.started_at),
            end: outcome.finished_at.as_ref().map(timestamp),
            status: outcome.status.as_str(),
            details: outcome.message.as_deref(),
            volume: outcome.parent_location.as_deref(),
            derivative: outcome.derivative_location.as_deref(),
            files: (!files.is_empty()).then_some(FileList { file: files }),
        }
    }
}
