//! MyCoRe ingest engine
//!
//! Moves a job's metadata document, its media files and text annotations
//! into a MyCoRe repository and keeps retrying until the repository reports
//! matching checksums for every file, or the configured number of rounds is
//! used up.
//!
//! # Overview
//!
//! - **Remote store** ([`api`]): object, derivative and content endpoints
//! - **Manifest** ([`manifest`]): per-file local and remote state
//! - **Engine** ([`engine`]): the upload/verify rounds
//! - **Receipt** ([`receipt`], [`reporter`]): the auditable record of a run
//! - **Host collaborators** ([`host`]): export, transform, file listing,
//!   journal and property stores

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod manifest;
pub mod receipt;
pub mod reporter;

// Re-export commonly used types
pub use config::IngestConfig;
pub use engine::{HostServices, IngestEngine, IngestReport, RunResult, RunState};
pub use error::{IngestError, Result};
pub use manifest::{FileCategory, Manifest, TransferRecord, Verification};
pub use receipt::{RunOutcome, RunStatus};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mci-ingest - ingest a job into a MyCoRe repository
#[derive(Parser, Debug)]
#[command(name = "mci-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, env = "MCI_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one job
    Run(RunArgs),

    /// Print the effective configuration
    ShowConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Job title; the export is expected as `<job>_mets.xml`
    #[arg(short, long)]
    pub job: String,

    /// Directory holding the exported metadata
    #[arg(long)]
    pub metadata_dir: PathBuf,

    /// Directory holding the media files (e.g. TIFF masters)
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// Directory holding the ALTO files
    #[arg(long)]
    pub annotation_dir: Option<PathBuf>,

    /// Journal folder receiving receipts, journal and properties
    #[arg(long)]
    pub journal_dir: PathBuf,

    /// Override max-tries
    #[arg(long)]
    pub max_tries: Option<u32>,

    /// Override mycore-api
    #[arg(long)]
    pub mycore_api: Option<String>,

    /// Override xslt-url
    #[arg(long)]
    pub xslt_url: Option<String>,
}
