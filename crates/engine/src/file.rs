use crate::error::{ErrorKind, Result};
use collectfast_storage::{BackendHandle, join_prefix};
use exn::ResultExt;
use futures::TryStreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// One file the host collected, and where it will be published.
#[derive(Clone)]
pub struct LocalFile {
    /// Path within [`source`](Self::source).
    pub path: PathBuf,
    /// Backend-normalized key on the target.
    pub remote_path: PathBuf,
    pub source: BackendHandle,
}

impl LocalFile {
    /// Describe `path` in `source`, published under an optional `prefix`.
    pub fn new(source: BackendHandle, path: impl AsRef<Path>, prefix: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let remote_path = join_prefix(prefix, path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            remote_path,
            source,
        })
    }

    /// Enumerate every file in `source`, sorted by remote path.
    pub async fn discover(source: BackendHandle, prefix: Option<&Path>) -> Result<Vec<Self>> {
        let infos: Vec<_> = source.list_stream(None).try_collect().await.or_raise(|| ErrorKind::Discovery)?;
        let mut files = infos
            .into_iter()
            .map(|info| Self::new(source.clone(), info.path, prefix))
            .collect::<Result<Vec<_>>>()
            .or_raise(|| ErrorKind::Discovery)?;
        files.sort_by(|a, b| a.remote_path.cmp(&b.remote_path));
        tracing::debug!(source = source.name(), count = files.len(), "Discovered local files");
        Ok(files)
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        self.source.read(&self.path).await.or_raise(|| ErrorKind::Read(self.path.clone()))
    }

    pub async fn modified(&self) -> Result<OffsetDateTime> {
        let info = self.source.stat(&self.path).await.or_raise(|| ErrorKind::Read(self.path.clone()))?;
        Ok(info.modified)
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("path", &self.path)
            .field("remote_path", &self.remote_path)
            .field("source", &self.source.name())
            .finish()
    }
}
