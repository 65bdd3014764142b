//! Remote state lookups.
//!
//! A [`RemoteFileIndex`] answers "what does the target hold at this path?"
//! either with one backend call per question ([`direct`](RemoteFileIndex::direct))
//! or from a snapshot taken with a single listing when the index is built
//! ([`preload`](RemoteFileIndex::preload)). The snapshot is never modified
//! after construction, so concurrent lookups need no locking.

use crate::error::{ErrorKind, Result};
use crate::key::{ComparisonKey, ComparisonKind, RemoteLookup};
use collectfast_storage::{BackendHandle, validate_path};
use exn::ResultExt;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct RemoteFileIndex {
    backend: BackendHandle,
    kind: ComparisonKind,
    /// `None` for a listed path means the listing had no usable key for it.
    snapshot: Option<HashMap<PathBuf, Option<ComparisonKey>>>,
}

impl RemoteFileIndex {
    /// Look every path up individually.
    pub fn direct(backend: BackendHandle, kind: ComparisonKind) -> Self {
        Self {
            backend,
            kind,
            snapshot: None,
        }
    }

    /// List the target once (optionally under `prefix`) and answer lookups
    /// from memory for the rest of the run.
    ///
    /// Paths missing from the listing are absent. Listed paths whose
    /// metadata carries no key of the right kind fall back to a direct
    /// lookup.
    pub async fn preload(backend: BackendHandle, kind: ComparisonKind, prefix: Option<&Path>) -> Result<Self> {
        let lookup_path = || ErrorKind::Lookup(prefix.map_or_else(|| PathBuf::from("."), Path::to_path_buf));
        let snapshot: HashMap<_, _> = backend
            .list_stream(prefix)
            .map_ok(|info| {
                let key = kind.key_from(&info);
                (info.path, key)
            })
            .try_collect()
            .await
            .or_raise(lookup_path)?;
        tracing::debug!(backend = backend.name(), entries = snapshot.len(), "Preloaded remote metadata");
        Ok(Self {
            backend,
            kind,
            snapshot: Some(snapshot),
        })
    }

    pub fn kind(&self) -> ComparisonKind {
        self.kind
    }

    pub fn is_preloaded(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Where `remote_path` stands on the target.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Lookup`] for anything other than a definite
    /// "not found" from the backend.
    pub async fn lookup(&self, remote_path: &Path) -> Result<RemoteLookup> {
        let path = validate_path(remote_path).or_raise(|| ErrorKind::Lookup(remote_path.to_path_buf()))?;
        match self.snapshot.as_ref().map(|snapshot| snapshot.get(&path)) {
            None => self.fetch(&path).await,
            Some(None) => Ok(RemoteLookup::Absent),
            Some(Some(Some(key))) => Ok(RemoteLookup::Present(key.clone())),
            Some(Some(None)) => {
                tracing::trace!(path = %path.display(), "Listing had no comparison key, looking up directly");
                self.fetch(&path).await
            },
        }
    }

    async fn fetch(&self, path: &Path) -> Result<RemoteLookup> {
        match self.backend.stat(path).await {
            Ok(info) => Ok(match self.kind.key_from(&info) {
                Some(key) => RemoteLookup::Present(key),
                None => {
                    // Present, but nothing to compare against: copying is
                    // the only safe answer.
                    tracing::debug!(path = %path.display(), "Remote file has no comparison key");
                    RemoteLookup::Absent
                },
            }),
            Err(e) if e.is_not_found() => Ok(RemoteLookup::Absent),
            Err(e) => Err(e).or_raise(|| ErrorKind::Lookup(path.to_path_buf())),
        }
    }
}
