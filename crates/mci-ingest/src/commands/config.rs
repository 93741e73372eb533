//! `show-config` command

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use std::path::Path;

/// Effective configuration as TOML, password redacted
pub fn render(config: &IngestConfig) -> Result<String> {
    toml::to_string_pretty(&config.redacted())
        .map_err(|e| IngestError::Serialization(e.to_string()))
}

pub fn show(config_path: Option<&Path>) -> Result<()> {
    let config = IngestConfig::load(config_path)?;
    print!("{}", render(&config)?);
    Ok(())
}
