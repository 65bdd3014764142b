//! In-memory storage backend.
//!
//! Behaves like a tiny object store: every write records an MD5 ETag, so the
//! same strategies that run against S3 can run against it. Two-pass
//! publishing stages hashed files here, and tests use it as a stand-in for a
//! bucket.

use super::{BackendKind, FileInfoStream, not_found};
use crate::StorageBackend;
use crate::error::Result;
use crate::models::{FileInfo, md5_etag};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Clone)]
struct Object {
    modified: OffsetDateTime,
    etag: String,
    data: Vec<u8>,
}
impl Object {
    fn new(data: Vec<u8>, modified: OffsetDateTime) -> Self {
        Self {
            modified,
            etag: md5_etag(&data),
            data,
        }
    }
}

/// In-memory storage backend.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation.
///
/// # Examples
///
/// ```
/// use collectfast_storage::{StorageBackend, backend::MemoryBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::with_files([("css/site.css", b"body{}".to_vec())]);
/// assert!(backend.exists(Path::new("css/site.css")).await?);
/// let info = backend.stat(Path::new("css/site.css")).await?;
/// assert!(info.etag.is_some());
/// # Ok(())
/// # }
/// ```
pub struct MemoryBackend {
    name: String,
    kind: BackendKind,
    storage: RwLock<HashMap<PathBuf, Object>>,
}

impl MemoryBackend {
    /// Create a memory backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). Only ever
    /// called with fixed, known paths.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let map = files
            .into_iter()
            .map(|(path, data)| {
                let path = path.into();
                let Ok(validated) = validate_path(&path) else {
                    panic!("MemoryBackend::with_files: invalid path {}", path.display());
                };
                (validated, Object::new(data.into(), now))
            })
            .collect();
        Self {
            name: "memory".to_string(),
            kind: BackendKind::ObjectStorage,
            storage: RwLock::new(map),
        }
    }

    /// Change the name of the backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report a different [`BackendKind`]. Lets tests exercise
    /// filesystem-only strategies without touching the disk.
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Insert a file with an explicit modification time.
    pub async fn insert_modified(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>, modified: OffsetDateTime) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, Object::new(data.into(), modified));
        Ok(())
    }

    /// Number of files currently held.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    fn file_info(&self, path: &Path, object: &Object) -> FileInfo {
        let info = FileInfo::new(path, object.data.len() as u64, object.modified);
        match self.kind {
            BackendKind::ObjectStorage => info.with_etag(object.etag.clone()),
            BackendKind::Filesystem => info,
        }
    }
}
impl Default for MemoryBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, object)| self.file_info(path, object))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let object = guard.get(&path).ok_or_else(|| not_found(&path))?;
        Ok(object.data.clone())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, Object::new(data.to_vec(), OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let object = guard.get(&path).ok_or_else(|| not_found(&path))?;
        Ok(self.file_info(&path, object))
    }
}
