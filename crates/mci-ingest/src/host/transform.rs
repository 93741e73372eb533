//! XSLT transform through `xsltproc`
//!
//! The stylesheet is downloaded for every run so that changes published at
//! `xslt-url` take effect without redeploying.

use crate::error::{IngestError, Result};
use crate::host::DocumentTransformer;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

pub const DEFAULT_PROGRAM: &str = "xsltproc";

/// Name of the stylesheet parameter carrying the parent identifier
pub const PARENT_ID_PARAM: &str = "parentID";

pub struct XsltProcTransformer {
    client: reqwest::Client,
    xslt_url: String,
    program: String,
    leading_args: Vec<String>,
}

impl XsltProcTransformer {
    pub fn new(xslt_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            xslt_url: xslt_url.into(),
            program: DEFAULT_PROGRAM.to_string(),
            leading_args: Vec::new(),
        })
    }

    /// Run `program` with `leading_args` in front of the xsltproc arguments
    pub fn with_command(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    async fn fetch_stylesheet(&self) -> Result<Vec<u8>> {
        if self.xslt_url.trim().is_empty() {
            return Err(IngestError::transform("xslt-url is not configured"));
        }

        let response = self.client.get(&self.xslt_url).send().await.map_err(|e| {
            IngestError::transform(format!("Cannot fetch stylesheet '{}': {}", self.xslt_url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::transform(format!(
                "Cannot fetch stylesheet '{}': HTTP {}",
                self.xslt_url, status
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            IngestError::transform(format!("Cannot fetch stylesheet '{}': {}", self.xslt_url, e))
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentTransformer for XsltProcTransformer {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn transform(&self, document: &Path, parent_id: &str) -> Result<String> {
        let stylesheet = self.fetch_stylesheet().await?;

        let mut xsl = tempfile::Builder::new()
            .prefix("mci-")
            .suffix(".xsl")
            .tempfile()
            .map_err(|e| IngestError::transform(format!("Cannot stage stylesheet: {}", e)))?;
        xsl.write_all(&stylesheet)
            .and_then(|_| xsl.flush())
            .map_err(|e| IngestError::transform(format!("Cannot stage stylesheet: {}", e)))?;

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("--stringparam")
            .arg(PARENT_ID_PARAM)
            .arg(parent_id)
            .arg(xsl.path())
            .arg(document)
            .output()
            .await
            .map_err(|e| IngestError::transform(format!("Cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(IngestError::transform(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let result = String::from_utf8(output.stdout)
            .map_err(|e| IngestError::transform(format!("Transform output is not UTF-8: {}", e)))?;
        if result.trim().is_empty() {
            return Err(IngestError::transform("Transform produced no output"));
        }

        debug!(bytes = result.len(), "Metadata transformed");
        Ok(result)
    }
}
