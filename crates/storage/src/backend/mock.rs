//! Instrumented backend for testing.

use super::{BackendKind, ContentEncoding, FileInfoStream, MemoryBackend};
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Backend operations counted by [`MockBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Exists,
    Read,
    Write,
    Stat,
    DigestMatches,
}

/// A [`MemoryBackend`] that records every call made to it and can be told to
/// fail for particular paths.
///
/// Counting calls is how tests tell a caching strategy (one listing) from a
/// plain one (one stat per file), and how they prove a disabled engine never
/// touched the target at all.
///
/// # Examples
///
/// ```
/// use collectfast_storage::StorageBackend;
/// use collectfast_storage::backend::{MockBackend, Operation};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::default().with_failing_lookup("css/broken.css");
/// assert!(backend.stat(Path::new("css/broken.css")).await.is_err());
/// assert_eq!(backend.calls(Operation::Stat), 1);
/// # }
/// ```
pub struct MockBackend {
    inner: MemoryBackend,
    calls: Mutex<HashMap<Operation, usize>>,
    failing_lookups: HashSet<PathBuf>,
    failing_writes: HashSet<PathBuf>,
    failing_listing: bool,
}

impl MockBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            failing_lookups: HashSet::new(),
            failing_writes: HashSet::new(),
            failing_listing: false,
        }
    }

    /// Make `stat`, `exists` and `digest_matches` fail with a network error
    /// for this path. Panics on an invalid path.
    pub fn with_failing_lookup(mut self, path: impl AsRef<Path>) -> Self {
        self.failing_lookups.insert(Self::valid(path));
        self
    }

    /// Make writes to this path fail. Panics on an invalid path.
    pub fn with_failing_write(mut self, path: impl AsRef<Path>) -> Self {
        self.failing_writes.insert(Self::valid(path));
        self
    }

    /// Make every listing fail.
    pub fn with_failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// The wrapped backend, for inspecting state without counting calls.
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Number of calls made for one operation.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Number of calls made for all operations.
    pub fn total_calls(&self) -> usize {
        self.lock().values().sum()
    }

    /// Forget all recorded calls.
    pub fn reset_calls(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Operation, usize>> {
        // A panicking test thread is the only way to poison this.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: Operation) {
        *self.lock().entry(operation).or_default() += 1;
    }

    fn valid(path: impl AsRef<Path>) -> PathBuf {
        match validate_path(path.as_ref()) {
            Ok(p) => p,
            Err(_) => panic!("MockBackend: invalid path {}", path.as_ref().display()),
        }
    }

    fn check_lookup(&self, path: &Path) -> Result<()> {
        if self.failing_lookups.contains(&validate_path(path)?) {
            exn::bail!(ErrorKind::Network(format!("simulated lookup failure for {}", path.display())));
        }
        Ok(())
    }

    fn check_write(&self, path: &Path) -> Result<()> {
        if self.failing_writes.contains(&validate_path(path)?) {
            exn::bail!(ErrorKind::Network(format!("simulated upload failure for {}", path.display())));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::new(MemoryBackend::default().with_name("mock"))
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.record(Operation::List);
        if self.failing_listing {
            let err = exn::Exn::from(ErrorKind::Network("simulated listing failure".to_string()));
            return Box::pin(futures::stream::once(async { Err(err) }));
        }
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.record(Operation::Exists);
        self.check_lookup(path)?;
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.record(Operation::Read);
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.record(Operation::Write);
        self.check_write(path)?;
        self.inner.write(path, data).await
    }

    async fn write_encoded(&self, path: &Path, data: &[u8], _encoding: ContentEncoding) -> Result<()> {
        self.write(path, data).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.record(Operation::Stat);
        self.check_lookup(path)?;
        self.inner.stat(path).await
    }

    async fn digest_matches(&self, path: &Path, etag: &str) -> Result<bool> {
        self.record(Operation::DigestMatches);
        self.check_lookup(path)?;
        // Answer from the inner backend so the fused call counts once.
        self.inner.digest_matches(path, etag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_calls() {
        let backend = MockBackend::default();
        backend.write(Path::new("a.css"), b"a").await.unwrap();
        backend.stat(Path::new("a.css")).await.unwrap();
        backend.stat(Path::new("a.css")).await.unwrap();
        backend.list(None).await.unwrap();
        assert_eq!(backend.calls(Operation::Write), 1);
        assert_eq!(backend.calls(Operation::Stat), 2);
        assert_eq!(backend.calls(Operation::List), 1);
        assert_eq!(backend.total_calls(), 4);
        backend.reset_calls();
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_digest_matches_counts_once() {
        let backend = MockBackend::default();
        backend.inner().write(Path::new("a.css"), b"a").await.unwrap();
        let etag = crate::models::md5_etag(b"a");
        assert!(backend.digest_matches(Path::new("a.css"), &etag).await.unwrap());
        assert_eq!(backend.calls(Operation::DigestMatches), 1);
        assert_eq!(backend.calls(Operation::Stat), 0);
    }

    #[tokio::test]
    async fn test_failures() {
        let backend = MockBackend::default().with_failing_lookup("bad.css").with_failing_write("ro.css");
        let err = backend.stat(Path::new("bad.css")).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(backend.write(Path::new("ro.css"), b"x").await.is_err());
        assert!(!backend.inner().exists(Path::new("ro.css")).await.unwrap());
        // Other paths are unaffected.
        backend.write(Path::new("ok.css"), b"x").await.unwrap();
        assert!(backend.stat(Path::new("ok.css")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_listing() {
        let backend = MockBackend::default().with_failing_listing();
        assert!(backend.list(None).await.is_err());
    }
}
