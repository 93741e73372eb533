//! Run-scoped configuration
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file using the plugin's kebab-case option names, and `MCI_*`
//! environment variables (a `.env` file is honoured).

use crate::error::{IngestError, Result};
use crate::manifest::SubfolderLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default number of upload/verify rounds.
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Default number of retries per file after its first transmission within one round.
pub const DEFAULT_UPLOAD_RETRIES: u32 = 3;

/// Default HTTP timeout in seconds. Large TIFF masters need the headroom.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default base delay between transmissions of the same file, doubled per retry.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Remote name of the metadata document inside the derivative.
pub const DEFAULT_METADATA_FILENAME: &str = "goobi_mets.xml";

/// Remote subfolder for text annotations (ALTO).
pub const DEFAULT_ANNOTATION_SUBFOLDER: &str = "ocr/alto/";

/// Job property holding the parent identifier passed to the transform.
pub const DEFAULT_IDENTIFIER_PROPERTY: &str = "MyCore-ID";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MCI_";

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IngestConfig {
    /// Location of the stylesheet turning the export into the store's schema
    pub xslt_url: String,

    /// Base URL of the remote REST API (the collection endpoint lives at `objects`)
    pub mycore_api: String,

    pub mycore_login: String,

    pub mycore_password: String,

    /// Bounded number of upload/verify rounds
    pub max_tries: u32,

    /// Retries per file after the first transmission inside one round; 0 sends once
    pub upload_retries: u32,

    pub timeout_secs: u64,

    pub retry_delay_ms: u64,

    pub metadata_filename: String,

    pub media_subfolder: String,

    pub annotation_subfolder: String,

    pub identifier_property: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            xslt_url: String::new(),
            mycore_api: String::new(),
            mycore_login: String::new(),
            mycore_password: String::new(),
            max_tries: DEFAULT_MAX_TRIES,
            upload_retries: DEFAULT_UPLOAD_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            metadata_filename: DEFAULT_METADATA_FILENAME.to_string(),
            media_subfolder: String::new(),
            annotation_subfolder: DEFAULT_ANNOTATION_SUBFOLDER.to_string(),
            identifier_property: DEFAULT_IDENTIFIER_PROPERTY.to_string(),
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("xslt_url", &self.xslt_url)
            .field("mycore_api", &self.mycore_api)
            .field("mycore_login", &self.mycore_login)
            .field("mycore_password", &"<redacted>")
            .field("max_tries", &self.max_tries)
            .field("upload_retries", &self.upload_retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("metadata_filename", &self.metadata_filename)
            .field("media_subfolder", &self.media_subfolder)
            .field("annotation_subfolder", &self.annotation_subfolder)
            .field("identifier_property", &self.identifier_property)
            .finish()
    }
}

impl IngestConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| IngestError::config(format!("Invalid TOML: {}", e)))
    }

    /// Apply `MCI_*` overrides looked up through `lookup`
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("XSLT_URL") {
            self.xslt_url = v;
        }
        if let Some(v) = var("MYCORE_API") {
            self.mycore_api = v;
        }
        if let Some(v) = var("MYCORE_LOGIN") {
            self.mycore_login = v;
        }
        if let Some(v) = var("MYCORE_PASSWORD") {
            self.mycore_password = v;
        }
        if let Some(v) = var("MAX_TRIES") {
            self.max_tries = parse_number("MAX_TRIES", &v)?;
        }
        if let Some(v) = var("UPLOAD_RETRIES") {
            self.upload_retries = parse_number("UPLOAD_RETRIES", &v)?;
        }
        if let Some(v) = var("TIMEOUT_SECS") {
            self.timeout_secs = parse_number("TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_number("RETRY_DELAY_MS", &v)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mycore_api.trim().is_empty() {
            return Err(IngestError::config("mycore-api cannot be empty"));
        }
        if !self.mycore_api.starts_with("http://") && !self.mycore_api.starts_with("https://") {
            return Err(IngestError::config(format!(
                "mycore-api must be an http(s) URL, got '{}'",
                self.mycore_api
            )));
        }
        if self.max_tries == 0 {
            return Err(IngestError::config("max-tries must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            return Err(IngestError::config("timeout-secs must be greater than 0"));
        }
        if self.metadata_filename.trim().is_empty() {
            return Err(IngestError::config("metadata-filename cannot be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before the given retry (1-based), doubling each time
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }

    pub fn layout(&self) -> SubfolderLayout {
        SubfolderLayout::new(&self.media_subfolder, &self.annotation_subfolder)
    }

    /// Remote name of the metadata companion, derived from the metadata name
    pub fn companion_filename(&self) -> String {
        companion_name(&self.metadata_filename)
    }

    /// Configuration safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.mycore_password.is_empty() {
            copy.mycore_password = "<redacted>".to_string();
        }
        copy
    }
}

/// Companion ("anchor") name for a metadata document name.
///
/// `x_mets.xml` becomes `x_mets_anchor.xml`; other names get `_anchor`
/// inserted before the extension.
pub fn companion_name(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("_mets.xml") {
        return format!("{}_mets_anchor.xml", stem);
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_anchor.{}", stem, ext),
        _ => format!("{}_anchor", name),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        IngestError::config(format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, value))
    })
}
