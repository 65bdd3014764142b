//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over every place static files are read from or published to:
//! the local source directories, a mirrored filesystem target, object
//! storage (S3-compatible services), and the in-memory staging area used by
//! two-pass publishing.

mod local;
mod memory;
#[cfg(feature = "mock")]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
pub use self::memory::MemoryBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// What sort of storage sits behind a backend.
///
/// Strategies are only valid for the kind of backend whose metadata they
/// understand; see `collectfast-engine`'s strategy factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// A directory tree. Reports modification times, no content fingerprint.
    Filesystem,
    /// A bucket-like store. Reports an ETag (MD5 of the stored bytes for
    /// single-part uploads).
    ObjectStorage,
}

/// `Content-Encoding` to record alongside an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
}
impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
        }
    }
}

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations and concurrent access.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use collectfast_storage::{StorageBackend, error::Result};
///
/// async fn publish_if_missing(backend: &dyn StorageBackend, data: &[u8]) -> Result<bool> {
///     let path = Path::new("css/site.css");
///     if backend.exists(path).await? {
///         return Ok(false);
///     }
///     backend.write(path, data).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Which comparison metadata this backend can offer.
    fn kind(&self) -> BackendKind;

    /// Root directory on the local filesystem, if there is one.
    fn location(&self) -> Option<&Path> {
        None
    }

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Prefix matching is component based: the prefix `css` matches
    /// `css/site.css` but not `cssfiles/site.css`. Listing a prefix that
    /// doesn't exist yields an empty stream, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use collectfast_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, creating or overwriting.
    ///
    /// Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Write file contents that are already encoded.
    ///
    /// Object stores record the encoding as object metadata so that clients
    /// get a `Content-Encoding` header; everything else stores the bytes as-is.
    async fn write_encoded(&self, path: &Path, data: &[u8], encoding: ContentEncoding) -> Result<()> {
        tracing::trace!(backend = self.name(), path = %path.display(), encoding = encoding.as_str(), "Backend does not record content encoding");
        self.write(path, data).await
    }

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist. Any other error means the state of the file is
    /// unknown, and callers must not treat it as absent *or* present.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Ask the backend whether it already holds `path` with the given
    /// (quoted hex MD5) ETag.
    ///
    /// Returns `Ok(false)` when the file is missing or differs. The default
    /// implementation is a [`stat()`](Self::stat); backends with conditional
    /// requests answer it in one round-trip of their own.
    async fn digest_matches(&self, path: &Path, etag: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(info) => Ok(info.etag.as_deref().is_some_and(|remote| etags_equal(remote, etag))),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Compare two ETags, ignoring the surrounding quotes some services (and
/// some SDKs) add or strip.
pub fn etags_equal(a: &str, b: &str) -> bool {
    a.trim_matches('"') == b.trim_matches('"')
}

pub(crate) fn not_found(path: &Path) -> crate::error::Error {
    exn::Exn::from(ErrorKind::NotFound(path.to_path_buf()))
}
