//! Response documents of the MyCoRe content API
//!
//! A contents listing looks like:
//!
//! ```xml
//! <directory name="jportal_derivate_00002172" modified="2024-05-02T10:11:12Z">
//!   <directory name="ocr" modified="..."/>
//!   <file name="00000001.tif" modified="..." md5="..." mimeType="image/tiff" size="1048576"/>
//! </directory>
//! ```

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// One directory level of a derivative's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(rename = "@name", default)]
    pub name: Option<String>,

    #[serde(rename = "@modified", default)]
    pub modified: Option<String>,

    /// Nested directories; only names are reported, never their files
    #[serde(rename = "directory", default)]
    pub directories: Vec<DirectoryListing>,

    #[serde(rename = "file", default)]
    pub files: Vec<RemoteFile>,
}

/// A file as the store currently holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@md5", default)]
    pub md5: Option<String>,

    #[serde(rename = "@mimeType", default)]
    pub mime_type: Option<String>,

    #[serde(rename = "@size", default)]
    pub size: Option<u64>,

    #[serde(rename = "@modified", default)]
    pub modified: Option<String>,
}

impl DirectoryListing {
    /// Parse a listing document
    pub fn parse(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| IngestError::Parse(e.to_string()))
    }

    pub fn file(&self, name: &str) -> Option<&RemoteFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <directory name="jportal_derivate_00002172" modified="2024-05-02T10:11:12.000Z">
            <directory name="ocr" modified="2024-05-02T10:11:12.000Z"/>
            <file name="00000001.tif" modified="2024-05-02T10:11:12.000Z"
                  md5="5EB63BBBE01EEED093CB22BB8F5ACDC3" mimeType="image/tiff" size="11"/>
            <file name="goobi_mets.xml" modified="2024-05-02T10:11:13.000Z"
                  md5="d41d8cd98f00b204e9800998ecf8427e" mimeType="application/xml" size="0"/>
        </directory>"#;

        let listing = DirectoryListing::parse(xml).unwrap();

        assert_eq!(listing.name.as_deref(), Some("jportal_derivate_00002172"));
        assert_eq!(listing.directories.len(), 1);
        assert_eq!(listing.files.len(), 2);

        let tif = listing.file("00000001.tif").unwrap();
        assert_eq!(tif.md5.as_deref(), Some("5EB63BBBE01EEED093CB22BB8F5ACDC3"));
        assert_eq!(tif.mime_type.as_deref(), Some("image/tiff"));
        assert_eq!(tif.size, Some(11));
        assert!(listing.file("missing.tif").is_none());
    }

    #[test]
    fn test_parse_interleaved_entries() {
        let xml = r#"<directory name="d">
            <file name="a.tif" md5="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"/>
            <directory name="ocr"/>
            <file name="b.tif" md5="bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"/>
        </directory>"#;

        let listing = DirectoryListing::parse(xml).unwrap();
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.directories.len(), 1);
    }

    #[test]
    fn test_parse_empty_directory() {
        let listing = DirectoryListing::parse(r#"<directory name="alto"/>"#).unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.directories.is_empty());
    }

    #[test]
    fn test_parse_malformed_is_parse_error() {
        // A file entry without a name cannot be matched to anything
        let result = DirectoryListing::parse(r#"<directory><file md5="abc"/></directory>"#);
        assert!(matches!(result, Err(IngestError::Parse(_))));

        let result = DirectoryListing::parse(r#"<directory><file name="a" size="big"/></directory>"#);
        assert!(matches!(result, Err(IngestError::Parse(_))));
    }
}
