//! In-memory [`RemoteStore`] for engine tests
//!
//! Stores uploaded bytes per subfolder and lists them with their real MD5,
//! unless a knob says otherwise.

use crate::api::client::RemoteStore;
use crate::api::endpoints::normalize_subfolder;
use crate::api::types::{DirectoryListing, RemoteFile};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use mci_common::checksum::compute_digest;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

pub const PARENT_LOCATION: &str = "http://mock.invalid/api/v2/objects/mock_volume_00000001";
pub const DERIVATIVE_LOCATION: &str =
    "http://mock.invalid/api/v2/objects/mock_volume_00000001/derivates/mock_derivate_00000001";

const WRONG_MD5: &str = "00000000000000000000000000000000";
const MODIFIED: &str = "2024-05-02T10:11:12.000Z";

#[derive(Default)]
struct StoredFile {
    bytes: Bytes,
    content_type: String,
}

#[derive(Default)]
struct MockState {
    files: BTreeMap<(String, String), StoredFile>,
    corrupted: HashSet<String>,
    hidden: HashSet<String>,
    put_failures: HashMap<String, u32>,
    listing_failures: u32,
    reject_parent: bool,
    reject_container: bool,
    omit_location: bool,
    uploads: HashMap<String, u32>,
    list_calls: u32,
    creates: u32,
}

#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// List `name` with a checksum that never matches
    pub fn corrupt(&self, name: &str) -> &Self {
        self.state().corrupted.insert(name.to_string());
        self
    }

    /// Leave `name` out of every listing
    pub fn hide(&self, name: &str) -> &Self {
        self.state().hidden.insert(name.to_string());
        self
    }

    /// Reject the next `times` uploads of `name` with HTTP 500
    pub fn fail_puts(&self, name: &str, times: u32) -> &Self {
        self.state().put_failures.insert(name.to_string(), times);
        self
    }

    /// Fail the next `times` listing requests
    pub fn fail_listings(&self, times: u32) -> &Self {
        self.state().listing_failures = times;
        self
    }

    pub fn reject_parent(&self) -> &Self {
        self.state().reject_parent = true;
        self
    }

    pub fn reject_container(&self) -> &Self {
        self.state().reject_container = true;
        self
    }

    /// Answer container creation with 201 but no location
    pub fn omit_location(&self) -> &Self {
        self.state().omit_location = true;
        self
    }

    /// Transmissions of `name`, including rejected ones
    pub fn uploads_of(&self, name: &str) -> u32 {
        self.state().uploads.get(name).copied().unwrap_or(0)
    }

    pub fn total_uploads(&self) -> u32 {
        self.state().uploads.values().sum()
    }

    pub fn list_calls(&self) -> u32 {
        self.state().list_calls
    }

    pub fn creates(&self) -> u32 {
        self.state().creates
    }

    /// Bytes currently stored under `subfolder`/`name`
    pub fn stored(&self, subfolder: &str, name: &str) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(&(normalize_subfolder(subfolder), name.to_string()))
            .map(|f| f.bytes.to_vec())
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn create_parent(&self, _document: &str) -> Result<String> {
        let mut state = self.state();
        state.creates += 1;
        if state.reject_parent {
            return Err(IngestError::rejected("creation of volume", 400, "invalid object"));
        }
        Ok(PARENT_LOCATION.to_string())
    }

    async fn create_derivative_container(
        &self,
        _parent_location: &str,
        _document: &str,
    ) -> Result<String> {
        let mut state = self.state();
        state.creates += 1;
        if state.reject_container {
            return Err(IngestError::rejected("creation of derivative", 403, "forbidden"));
        }
        if state.omit_location {
            return Err(IngestError::MissingLocation("derivative".to_string()));
        }
        Ok(DERIVATIVE_LOCATION.to_string())
    }

    async fn put_file(
        &self,
        _container_location: &str,
        subfolder: &str,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let mut state = self.state();
        *state.uploads.entry(filename.to_string()).or_insert(0) += 1;

        if let Some(remaining) = state.put_failures.get_mut(filename) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IngestError::rejected(
                    format!("upload of {}", filename),
                    500,
                    "storage unavailable",
                ));
            }
        }

        state.files.insert(
            (normalize_subfolder(subfolder), filename.to_string()),
            StoredFile {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list_contents(
        &self,
        _container_location: &str,
        subfolder: &str,
    ) -> Result<DirectoryListing> {
        let mut state = self.state();
        state.list_calls += 1;

        if state.listing_failures > 0 {
            state.listing_failures -= 1;
            return Err(IngestError::transport("listing", "connection reset"));
        }

        let folder = normalize_subfolder(subfolder);
        let files = state
            .files
            .iter()
            .filter(|((sub, name), _)| *sub == folder && !state.hidden.contains(name))
            .map(|((_, name), stored)| RemoteFile {
                name: name.clone(),
                md5: Some(if state.corrupted.contains(name) {
                    WRONG_MD5.to_string()
                } else {
                    compute_digest(&stored.bytes).to_string()
                }),
                mime_type: Some(stored.content_type.clone()),
                size: Some(stored.bytes.len() as u64),
                modified: Some(MODIFIED.to_string()),
            })
            .collect();

        Ok(DirectoryListing {
            name: Some("mock_derivate_00000001".to_string()),
            modified: Some(MODIFIED.to_string()),
            directories: Vec::new(),
            files,
        })
    }
}
