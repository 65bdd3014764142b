//! Two-pass publishing.
//!
//! Some deployments serve assets under content-hashed names (`app.css` is
//! published as `app.3f2a1c9b04de.css` as well) and ship a manifest mapping
//! one to the other. The hashed names only exist once every file has been
//! read, and the manifest can only be written once every hashed name is
//! known, so publishing happens in two phases:
//!
//! 1. **Resolving**: [`ManifestResolver::resolve`] reads each file, derives
//!    its hashed name and stages both copies. Nothing is written to the
//!    target.
//! 2. **Publishing**: [`ManifestResolver::finish`] stages the manifest and
//!    hands back every staged file (originals, hashed copies and the
//!    manifest) for the normal strategy to publish.

use crate::error::{ErrorKind, Result};
use crate::file::LocalFile;
use collectfast_config::Staging;
use collectfast_storage::backend::{LocalBackend, MemoryBackend};
use collectfast_storage::{BackendHandle, to_key};
use exn::ResultExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Manifest format version, as understood by hashed-name aware servers.
const MANIFEST_VERSION: &str = "1.1";
/// Hex characters of the content digest kept in a hashed name.
const HASH_LENGTH: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Publishing,
}

/// Original name to content-hashed name, keyed by remote path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestMapping {
    paths: BTreeMap<PathBuf, PathBuf>,
}

impl ManifestMapping {
    pub fn get(&self, original: &Path) -> Option<&Path> {
        self.paths.get(original).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.paths.iter().map(|(original, hashed)| (original.as_path(), hashed.as_path()))
    }

    /// Render the manifest file.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Manifest<'a> {
            paths: &'a BTreeMap<String, String>,
            version: &'static str,
            hash: String,
        }
        let to_manifest_err = || ErrorKind::Manifest("path is not valid in a manifest".to_string());
        let paths = self
            .paths
            .iter()
            .map(|(original, hashed)| Ok((to_key(original)?, to_key(hashed)?)))
            .collect::<collectfast_storage::error::Result<BTreeMap<_, _>>>()
            .or_raise(to_manifest_err)?;
        let serialized = serde_json::to_vec(&paths).or_raise(|| ErrorKind::Manifest("could not serialize".to_string()))?;
        let manifest = Manifest {
            paths: &paths,
            version: MANIFEST_VERSION,
            hash: short_hash(&serialized),
        };
        serde_json::to_vec_pretty(&manifest).or_raise(|| ErrorKind::Manifest("could not serialize".to_string()))
    }
}

fn short_hash(data: &[u8]) -> String {
    let hex = blake3::hash(data).to_hex();
    hex.as_str()[..HASH_LENGTH].to_string()
}

/// `css/app.css` becomes `css/app.<hash>.css`.
pub fn hashed_name(path: &Path, content: &[u8]) -> PathBuf {
    let hash = short_hash(content);
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{hash}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{hash}"),
    };
    path.with_file_name(name)
}

/// Runs pass one and prepares pass two.
pub struct ManifestResolver {
    staging: BackendHandle,
    // Held so the directory outlives the staged files.
    _directory: Option<TempDir>,
    manifest_name: PathBuf,
    phase: Phase,
    mapping: ManifestMapping,
}

impl ManifestResolver {
    pub fn new(staging: Staging, manifest_name: impl Into<PathBuf>) -> Result<Self> {
        match staging {
            Staging::Memory => Ok(Self::in_memory(manifest_name)),
            Staging::Filesystem => Self::on_disk(manifest_name),
        }
    }

    pub fn in_memory(manifest_name: impl Into<PathBuf>) -> Self {
        Self::with_staging(Arc::new(MemoryBackend::default().with_name("staging")), None, manifest_name.into())
    }

    /// Stage into a temporary directory, removed when the resolver is dropped.
    pub fn on_disk(manifest_name: impl Into<PathBuf>) -> Result<Self> {
        let directory = tempfile::Builder::new().prefix("collectfast-").tempdir().or_raise(|| ErrorKind::Staging)?;
        let backend = LocalBackend::new("staging", directory.path()).or_raise(|| ErrorKind::Staging)?;
        Ok(Self::with_staging(Arc::new(backend), Some(directory), manifest_name.into()))
    }

    fn with_staging(staging: BackendHandle, directory: Option<TempDir>, manifest_name: PathBuf) -> Self {
        Self {
            staging,
            _directory: directory,
            manifest_name,
            phase: Phase::Resolving,
            mapping: ManifestMapping::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mapping(&self) -> &ManifestMapping {
        &self.mapping
    }

    /// Pass one for a single file. Returns the hashed remote path.
    ///
    /// A file published under the manifest's own name is rejected; the
    /// manifest would replace it.
    pub async fn resolve(&mut self, file: &LocalFile) -> Result<PathBuf> {
        if self.phase != Phase::Resolving {
            exn::bail!(ErrorKind::Manifest("cannot resolve after publishing has started".to_string()));
        }
        if file.remote_path == self.manifest_name {
            exn::bail!(ErrorKind::ReservedName(file.remote_path.clone()));
        }
        let data = file.read().await?;
        let hashed = hashed_name(&file.remote_path, &data);
        for path in [&file.remote_path, &hashed] {
            self.staging.write(path, &data).await.or_raise(|| ErrorKind::Staging)?;
        }
        tracing::trace!(original = %file.remote_path.display(), hashed = %hashed.display(), "Resolved hashed name");
        self.mapping.paths.insert(file.remote_path.clone(), hashed.clone());
        Ok(hashed)
    }

    /// Stage the manifest and switch to publishing.
    ///
    /// Returns the pass-two file set: every original, every hashed copy and
    /// the manifest, all read from the staging area.
    pub async fn finish(&mut self) -> Result<Vec<LocalFile>> {
        if self.phase != Phase::Resolving {
            exn::bail!(ErrorKind::Manifest("manifest already written".to_string()));
        }
        self.staging
            .write(&self.manifest_name, &self.mapping.to_json()?)
            .await
            .or_raise(|| ErrorKind::Staging)?;
        self.phase = Phase::Publishing;

        let mut files = Vec::with_capacity(self.mapping.len() * 2 + 1);
        for (original, hashed) in self.mapping.iter() {
            files.push(LocalFile::new(self.staging.clone(), original, None)?);
            files.push(LocalFile::new(self.staging.clone(), hashed, None)?);
        }
        files.push(LocalFile::new(self.staging.clone(), &self.manifest_name, None)?);
        tracing::debug!(resolved = self.mapping.len(), files = files.len(), "Manifest staged");
        Ok(files)
    }
}
