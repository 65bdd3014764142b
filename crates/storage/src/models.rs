//! Storage models.
//!
//! Metadata reported by storage backends for listing and stat operations.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends.
///
/// This represents information about a file in storage, used for listing
/// operations and copy-or-skip comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
    /// Revision token reported by object stores (S3-style ETag, quotes
    /// included). Filesystem backends don't have one.
    pub etag: Option<String>,
}
impl FileInfo {
    /// Create a new FileInfo from a listing operation (no etag).
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Quoted hex MD5 digest, the same shape S3 reports for single-part uploads.
pub(crate) fn md5_etag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}
