//! MCI Common Library
//!
//! Shared utilities for the MyCoRe ingest workspace.
//!
//! - **Checksums**: MD5 content digests of local files
//! - **Error Handling**: Common error and result types
//! - **Logging**: `tracing` subscriber setup for binaries
//!
//! # Example
//!
//! ```no_run
//! use mci_common::checksum;
//!
//! fn fingerprint(path: &str) -> mci_common::Result<()> {
//!     let digest = checksum::digest(path)?;
//!     println!("{path}: {digest}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

pub use checksum::Digest;
pub use error::{CommonError, Result};
