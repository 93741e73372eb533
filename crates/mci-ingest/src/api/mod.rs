//! Remote store access: URL scheme, listing documents and the HTTP client

pub mod client;
pub mod endpoints;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{MycoreClient, RemoteStore};
pub use types::{DirectoryListing, RemoteFile};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockStore;
