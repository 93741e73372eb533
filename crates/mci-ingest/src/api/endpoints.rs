//! URL construction for the MyCoRe REST API
//!
//! Centralizes the URL scheme:
//!
//! - `{api}/objects`: collection endpoint, parent objects are created here
//! - `{parent}/derivates`: derivative containers of one parent
//! - `{derivative}/contents/{subfolder}{filename}`: file content

/// Collection endpoint for parent objects
pub fn objects_url(api_base: &str) -> String {
    format!("{}/objects", api_base.trim_end_matches('/'))
}

/// Derivative collection below a parent location
pub fn derivates_url(parent_location: &str) -> String {
    format!("{}/derivates", parent_location.trim_end_matches('/'))
}

/// Directory URL for a subfolder of a derivative's contents.
///
/// Always ends in `/`, which is what the store expects for listings.
pub fn contents_url(container_location: &str, subfolder: &str) -> String {
    format!(
        "{}/contents/{}",
        container_location.trim_end_matches('/'),
        normalize_subfolder(subfolder)
    )
}

/// URL of a single file inside a derivative
pub fn content_file_url(container_location: &str, subfolder: &str, filename: &str) -> String {
    format!("{}{}", contents_url(container_location, subfolder), filename)
}

/// Canonical subfolder form: no leading slash, trailing slash unless empty
pub fn normalize_subfolder(subfolder: &str) -> String {
    let trimmed = subfolder.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}
