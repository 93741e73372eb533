//! Content digests for file verification
//!
//! MD5 is used because it is the digest the remote store reports for its
//! content listings. Two files with identical bytes always produce the same
//! [`Digest`]; names, sizes and timestamps play no part in the comparison.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Read buffer size used when hashing files
const BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hexadecimal MD5 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a 32 character hex digest, normalising it to lowercase
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self> {
        let hex = hex.as_ref().trim();
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CommonError::InvalidDigest(hex.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a digest reported by another party.
    ///
    /// Case-insensitive; anything that is not the same hex value is a mismatch.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// Compute the digest of in-memory bytes
pub fn compute_digest(data: &[u8]) -> Digest {
    Digest(format!("{:x}", md5::compute(data)))
}

/// Compute the digest of any readable source
pub fn compute_reader_digest<R: Read>(reader: &mut R) -> Result<Digest> {
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(Digest(format!("{:x}", context.compute())))
}

/// Compute the digest of a local file.
///
/// Fails with [`CommonError::Io`] when the file cannot be opened or read.
pub fn digest(path: impl AsRef<Path>) -> Result<Digest> {
    let mut file = std::fs::File::open(path.as_ref())?;
    compute_reader_digest(&mut file)
}
