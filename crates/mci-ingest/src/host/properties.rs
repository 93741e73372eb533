//! Job property stores
//!
//! Names are matched case-insensitively on read, the way workflow hosts
//! treat property names. Writes replace an existing entry of the same name
//! regardless of case.

use crate::error::{IngestError, Result};
use crate::host::PropertyStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub const PROPERTIES_FILENAME: &str = "properties.json";

type JobProperties = BTreeMap<String, String>;
type PropertyMap = BTreeMap<String, JobProperties>;

fn lookup(properties: Option<&JobProperties>, name: &str) -> Option<String> {
    properties?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn insert(properties: &mut JobProperties, name: &str, value: &str) {
    properties.retain(|key, _| !key.eq_ignore_ascii_case(name));
    properties.insert(name.to_string(), value.to_string());
}

/// `properties.json` holding `{ job: { name: value } }`
pub struct JsonPropertyStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonPropertyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(PROPERTIES_FILENAME)
    }

    async fn load(&self) -> Result<PropertyMap> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                IngestError::host(format!("Invalid property file '{}': {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PropertyMap::new()),
            Err(e) => Err(IngestError::host(format!(
                "Cannot read '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, map: &PropertyMap) -> Result<()> {
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| IngestError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            IngestError::host(format!("Cannot create '{}': {}", self.dir.display(), e))
        })?;

        let path = self.path();
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| IngestError::host(format!("Cannot write '{}': {}", path.display(), e)))
    }
}

#[async_trait]
impl PropertyStore for JsonPropertyStore {
    async fn get(&self, job: &str, name: &str) -> Result<Option<String>> {
        let map = self.load().await?;
        Ok(lookup(map.get(job), name))
    }

    async fn set(&self, job: &str, name: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        insert(map.entry(job.to_string()).or_default(), name, value);
        self.save(&map).await
    }
}

#[derive(Default)]
pub struct MemoryPropertyStore {
    map: Mutex<PropertyMap>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with properties of one job
    pub fn with_properties<'a>(
        job: &str,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut job_properties = JobProperties::new();
        for (name, value) in properties {
            insert(&mut job_properties, name, value);
        }
        Self {
            map: Mutex::new(PropertyMap::from([(job.to_string(), job_properties)])),
        }
    }

    /// Snapshot of one job's properties
    pub fn properties(&self, job: &str) -> JobProperties {
        self.map
            .lock()
            .ok()
            .and_then(|map| map.get(job).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PropertyStore for MemoryPropertyStore {
    async fn get(&self, job: &str, name: &str) -> Result<Option<String>> {
        let map = self
            .map
            .lock()
            .map_err(|e| IngestError::host(format!("Failed to acquire property lock: {}", e)))?;
        Ok(lookup(map.get(job), name))
    }

    async fn set(&self, job: &str, name: &str, value: &str) -> Result<()> {
        let mut map = self
            .map
            .lock()
            .map_err(|e| IngestError::host(format!("Failed to acquire property lock: {}", e)))?;
        insert(map.entry(job.to_string()).or_default(), name, value);
        Ok(())
    }
}
