//! Local filesystem storage backend.
//!
//! Serves two roles: the source directories static files are collected from,
//! and the target of a mirrored-filesystem publish. Files are accessed using
//! `tokio::fs` for async I/O.

use crate::backend::{BackendKind, FileInfoStream};
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::HashSet;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// All paths are relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use collectfast_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("static-root", "/srv/www/static")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory. A missing root is created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Non-async: happens once, at startup.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Classify one directory entry. Pulled out of the stream below because
    /// `?` doesn't work inside `stream!`.
    ///
    /// Symlinks are followed, matching [`stat`](StorageBackend::stat).
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Dangling symlink.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalkEntry::Skip),
            Err(e) => exn::bail!(Self::map_io_error(e, &path)),
        };
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Descend when the directory is on the way to the prefix, or already inside it.
            return match prefix {
                Some(pfx) if !(relative.starts_with(pfx) || pfx.starts_with(&relative)) => Ok(WalkEntry::Skip),
                _ => Ok(WalkEntry::Descend(path)),
            };
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Sockets, FIFOs and the like.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];
        let mut visited = HashSet::new();

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                // Linked directories can form cycles.
                if let Ok(real) = fs::canonicalize(&current).await
                    && !visited.insert(real)
                {
                    continue 'dirs;
                }
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Same as object storage: listing nothing is not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(&validate_path(path)?, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("static-root", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/static").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("collected/static");
        let backend = LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.location(), Some(root.as_path()));
        assert_eq!(backend.kind(), BackendKind::Filesystem);
    }

    #[test]
    fn test_path_mapping() {
        let (temp_dir, backend) = backend();
        let abs = temp_dir.path().join("css/site.css");
        assert_eq!(backend.absolute_path("css/site.css").unwrap(), abs);
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("css/site.css"));
        assert!(backend.absolute_path("../etc/passwd").is_err());
        assert!(backend.relative_path("/elsewhere/site.css").is_err());
    }

    #[tokio::test]
    async fn test_write_read_exists() {
        let (_temp_dir, backend) = backend();
        assert!(!backend.exists(Path::new("js/app.js")).await.unwrap());
        backend.write(Path::new("js/app.js"), b"console.log(1)").await.unwrap();
        assert!(backend.exists(Path::new("js/app.js")).await.unwrap());
        assert_eq!(backend.read(Path::new("js/app.js")).await.unwrap(), b"console.log(1)");
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("./css//site.css"), b"body{}").await.unwrap();
        let info = backend.stat(Path::new("css/site.css")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("css/site.css"));
        assert_eq!(info.size, 6);
        assert!(info.etag.is_none());
    }

    #[tokio::test]
    async fn test_stat_missing_is_not_found() {
        let (_temp_dir, backend) = backend();
        let err = backend.stat(Path::new("missing.css")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        // A directory is not a file either.
        backend.write(Path::new("css/site.css"), b"").await.unwrap();
        let err = backend.stat(Path::new("css")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list() {
        let (_temp_dir, backend) = backend();
        assert!(backend.list(None).await.unwrap().is_empty());
        backend.write(Path::new("css/site.css"), b"a").await.unwrap();
        backend.write(Path::new("css/admin/base.css"), b"b").await.unwrap();
        backend.write(Path::new("cssx/other.css"), b"c").await.unwrap();
        backend.write(Path::new("robots.txt"), b"d").await.unwrap();
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
        let mut css: Vec<_> = backend.list(Some(Path::new("css"))).await.unwrap().into_iter().map(|f| f.path).collect();
        css.sort();
        assert_eq!(css, vec![PathBuf::from("css/admin/base.css"), PathBuf::from("css/site.css")]);
        let nested = backend.list(Some(Path::new("css/admin"))).await.unwrap();
        assert_eq!(nested.len(), 1);
        assert!(backend.list(Some(Path::new("nonexistent"))).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_follows_symlinks() {
        use std::os::unix::fs::symlink;

        let (temp_dir, backend) = backend();
        let elsewhere = tempfile::tempdir().unwrap();
        std::fs::write(elsewhere.path().join("vendor.js"), b"vendor").unwrap();
        std::fs::create_dir(elsewhere.path().join("lib")).unwrap();
        std::fs::write(elsewhere.path().join("lib/util.js"), b"util").unwrap();
        backend.write(Path::new("app.js"), b"app").await.unwrap();
        let root = temp_dir.path();
        symlink(elsewhere.path().join("vendor.js"), root.join("vendor.js")).unwrap();
        symlink(elsewhere.path().join("lib"), root.join("lib")).unwrap();
        symlink(elsewhere.path().join("missing.js"), root.join("broken.js")).unwrap();
        symlink(root, root.join("loop")).unwrap();

        let mut listed: Vec<_> = backend.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        listed.sort();
        assert_eq!(
            listed,
            vec![PathBuf::from("app.js"), PathBuf::from("lib/util.js"), PathBuf::from("vendor.js")]
        );
        let listed_vendor = backend.list(Some(Path::new("vendor.js"))).await.unwrap();
        let stat_vendor = backend.stat(Path::new("vendor.js")).await.unwrap();
        assert_eq!(listed_vendor[0].size, stat_vendor.size);
        assert_eq!(listed_vendor[0].modified, stat_vendor.modified);
        assert!(matches!(&*backend.stat(Path::new("broken.js")).await.unwrap_err(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.css"), b"data").await.is_err());
        assert!(backend.stat(Path::new("css/../../x")).await.is_err());
    }
}
