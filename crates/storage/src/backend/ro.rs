//! Read-only storage backend.
//!
//! Wraps another backend and drops write operations while still reporting
//! success. This is what `--dry-run` publishes through: every decision is
//! made against the real target, nothing is uploaded.

use async_trait::async_trait;
use std::path::Path;

use crate::backend::{BackendKind, ContentEncoding, FileInfoStream};
use crate::{BackendHandle, FileInfo, StorageBackend, error::Result};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event).
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn location(&self) -> Option<&Path> {
        self.inner.location()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = data.len(), "Pretending to copy");
        Ok(())
    }

    async fn write_encoded(&self, path: &Path, data: &[u8], encoding: ContentEncoding) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = data.len(), encoding = encoding.as_str(), "Pretending to copy");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }

    async fn digest_matches(&self, path: &Path, etag: &str) -> Result<bool> {
        self.inner.digest_matches(path, etag).await
    }
}
