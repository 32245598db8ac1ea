//! # Package Index Server
//!
//! HTTP front end for the `pkgindex_core` package index. It speaks the two
//! legacy protocols Python tooling uses against an index:
//!
//! - the distutils action protocol (`register`, `upload`,
//!   `list_classifiers`), posted as form data to `/` or `/pypi`
//! - the XML-RPC query protocol used by installers and `pip search`, posted
//!   as `text/xml` to the same paths
//!
//! Uploaded files are written by [`storage::FsContentStore`] and served back
//! under `/packages/`.
//!
//! ## Key Modules
//!
//! - [`config`]: JSON configuration and defaults
//! - [`state`]: shared application state
//! - [`error`]: error type and plain-text responses
//! - [`auth`]: HTTP Basic authentication of publishers
//! - [`distutils`]: the action endpoint
//! - [`rpc`]: XML-RPC value model, codec and command dispatch
//! - [`packages`]: downloads, search documents and release visibility

pub mod auth;
pub mod config;
pub mod distutils;
pub mod error;
pub mod packages;
pub mod rpc;
pub mod server;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorCode};
pub use server::{create_app, run_server};
pub use state::AppState;

/// Calculate SHA256 hash of data as lowercase hex.
///
/// ```
/// # use pkgindex_server::sha256_hash;
/// let hash = sha256_hash(b"hello world");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Validate a client-supplied file or package name used as a single path
/// segment.
///
/// ```
/// # use pkgindex_server::validate_filename;
/// assert!(validate_filename("foo-1.0.tar.gz").is_ok());
/// assert!(validate_filename("../etc/passwd").is_err());
/// assert!(validate_filename("/absolute/path").is_err());
/// ```
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.is_empty() {
        tracing::warn!("Empty filename provided");
        return Err(AppError::BadRequest("Filename cannot be empty".to_string()));
    }

    const MAX_FILENAME_LENGTH: usize = 255;
    if filename.len() > MAX_FILENAME_LENGTH {
        tracing::warn!(filename = %filename, length = %filename.len(), "Filename too long");
        return Err(AppError::BadRequest(format!(
            "Filename too long: {} characters (max: {})",
            filename.len(),
            MAX_FILENAME_LENGTH
        )));
    }

    if filename.chars().any(|c| c.is_control()) {
        tracing::warn!(filename = %filename, "Control character detected in filename");
        return Err(AppError::BadRequest(
            "Filename contains control characters".to_string(),
        ));
    }

    if filename.contains("..") {
        tracing::warn!(filename = %filename, "Path traversal attempt detected (..)");
        return Err(AppError::BadRequest(
            "Filename contains parent directory reference (..)".to_string(),
        ));
    }

    if filename.starts_with('/') || filename.starts_with('\\') {
        tracing::warn!(filename = %filename, "Absolute path detected");
        return Err(AppError::BadRequest(
            "Filename cannot be an absolute path".to_string(),
        ));
    }

    if filename.contains('/') || filename.contains('\\') {
        tracing::warn!(filename = %filename, "Directory separator detected in filename");
        return Err(AppError::BadRequest(
            "Filename cannot contain directory separators".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        assert_eq!(
            sha256_hash(b"secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn test_validate_filename() {
        for good in ["foo-1.0.tar.gz", "foo-1.0-py2.7-linux_x86_64.egg", "a"] {
            assert!(validate_filename(good).is_ok(), "{good}");
        }
        for bad in ["", "..", "a/../b", "dir/file", "C:\\x", "\\share", "/etc", "a\0b", "tab\t"] {
            assert!(validate_filename(bad).is_err(), "{bad:?}");
        }
        assert!(validate_filename(&"x".repeat(256)).is_err());
    }
}
