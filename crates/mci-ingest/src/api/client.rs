//! HTTP client for the MyCoRe REST API
//!
//! Every call is a single request with basic authentication. Nothing is
//! cached and no call mutates engine state; the caller decides what a
//! failure means.

use crate::api::{endpoints, types::DirectoryListing};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, instrument};

const XML: &str = "application/xml";

/// The four remote operations the reconciliation loop needs
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the parent object from the transformed document, returning its location
    async fn create_parent(&self, document: &str) -> Result<String>;

    /// Create a derivative container below `parent_location`, returning its location
    async fn create_derivative_container(
        &self,
        parent_location: &str,
        document: &str,
    ) -> Result<String>;

    /// Store `bytes` as `{subfolder}{filename}`, overwriting any previous content
    async fn put_file(
        &self,
        container_location: &str,
        subfolder: &str,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<()>;

    /// What the store currently holds under `subfolder`
    async fn list_contents(
        &self,
        container_location: &str,
        subfolder: &str,
    ) -> Result<DirectoryListing>;
}

/// reqwest-backed [`RemoteStore`]
pub struct MycoreClient {
    client: Client,
    api_base: String,
    login: String,
    password: String,
}

impl MycoreClient {
    pub fn new(
        api_base: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mci-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            login: login.into(),
            password: password.into(),
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::new(
            config.mycore_api.clone(),
            config.mycore_login.clone(),
            config.mycore_password.clone(),
            config.timeout(),
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.login, Some(&self.password))
    }

    async fn create(&self, url: &str, document: &str, what: &str) -> Result<String> {
        let operation = format!("creation of {}", what);

        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_TYPE, XML)
            .header(ACCEPT, XML)
            .body(document.to_string())
            .send()
            .await
            .map_err(|e| IngestError::transport(&operation, e))?;

        let response = ensure_success(response, &operation).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| IngestError::MissingLocation(what.to_string()))?;

        // Relative locations resolve against the request URL
        let resolved = response
            .url()
            .join(location)
            .map_err(|_| IngestError::MissingLocation(what.to_string()))?;

        Ok(resolved.to_string())
    }
}

#[async_trait]
impl RemoteStore for MycoreClient {
    #[instrument(skip(self, document))]
    async fn create_parent(&self, document: &str) -> Result<String> {
        let url = endpoints::objects_url(&self.api_base);
        self.create(&url, document, "volume").await
    }

    #[instrument(skip(self, document))]
    async fn create_derivative_container(
        &self,
        parent_location: &str,
        document: &str,
    ) -> Result<String> {
        let url = endpoints::derivates_url(parent_location);
        self.create(&url, document, "derivative").await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put_file(
        &self,
        container_location: &str,
        subfolder: &str,
        filename: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<()> {
        let url = endpoints::content_file_url(container_location, subfolder, filename);
        let operation = format!("upload of {}", filename);

        let response = self
            .authorized(self.client.put(&url))
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, XML)
            .body(bytes)
            .send()
            .await
            .map_err(|e| IngestError::transport(&operation, e))?;

        ensure_success(response, &operation).await?;
        debug!(url = %url, "File stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_contents(
        &self,
        container_location: &str,
        subfolder: &str,
    ) -> Result<DirectoryListing> {
        let url = endpoints::contents_url(container_location, subfolder);
        let operation = format!("listing of {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .header(ACCEPT, XML)
            .send()
            .await
            .map_err(|e| IngestError::transport(&operation, e))?;

        let body = ensure_success(response, &operation)
            .await?
            .text()
            .await
            .map_err(|e| IngestError::transport(&operation, e))?;

        DirectoryListing::parse(&body)
    }
}

/// Turn a non-2xx response into `RemoteRejected` carrying status and body
async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(IngestError::rejected(operation, status.as_u16(), body))
}
