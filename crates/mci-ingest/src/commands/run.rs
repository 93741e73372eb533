//! `run` command: wire the default collaborators and ingest one job

use crate::api::MycoreClient;
use crate::config::IngestConfig;
use crate::engine::{HostServices, IngestEngine, IngestReport};
use crate::error::Result;
use crate::host::{
    DirectoryEnumerator, FileReceiptStore, JsonPropertyStore, JsonlJournal, PreExportedMetadata,
    XsltProcTransformer,
};
use crate::RunArgs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Apply command-line overrides on top of file and environment values
pub fn effective_config(config_path: Option<&Path>, args: &RunArgs) -> Result<IngestConfig> {
    let mut config = IngestConfig::load(config_path)?;

    if let Some(max_tries) = args.max_tries {
        config.max_tries = max_tries;
    }
    if let Some(api) = &args.mycore_api {
        config.mycore_api = api.clone();
    }
    if let Some(url) = &args.xslt_url {
        config.xslt_url = url.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Directory-backed collaborators for a stand-alone run
pub fn default_host(config: &IngestConfig, args: &RunArgs) -> Result<HostServices> {
    Ok(HostServices {
        exporter: Arc::new(PreExportedMetadata::new(&args.metadata_dir)),
        transformer: Arc::new(XsltProcTransformer::new(&config.xslt_url, config.timeout())?),
        enumerator: Arc::new(DirectoryEnumerator::new(
            args.media_dir.clone(),
            args.annotation_dir.clone(),
        )),
        properties: Arc::new(JsonPropertyStore::new(&args.journal_dir)),
        journal: Arc::new(JsonlJournal::new(&args.journal_dir)),
        receipts: Arc::new(FileReceiptStore::new(&args.journal_dir)),
    })
}

pub async fn run(config_path: Option<&Path>, args: &RunArgs) -> Result<IngestReport> {
    let config = effective_config(config_path, args)?;
    info!(job = %args.job, config = ?config, "Configuration loaded");

    let store = Arc::new(MycoreClient::from_config(&config)?);
    let host = default_host(&config, args)?;

    let engine = IngestEngine::new(config, args.job.clone(), store, host);
    Ok(engine.run().await)
}
