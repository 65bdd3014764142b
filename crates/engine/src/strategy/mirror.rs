use crate::error::Result;
use crate::file::LocalFile;
use crate::index::RemoteFileIndex;
use crate::key::{ComparisonKey, ComparisonKind};
use crate::policy::decide;
use crate::strategy::{Body, Checked, Strategy, upload};
use async_trait::async_trait;
use collectfast_storage::BackendHandle;

/// Compares modification times against a mirrored directory.
///
/// A mirrored copy that is at least as new as the local file (to the second)
/// is assumed current. Clock skew between machines, or a file rewritten
/// within the same second as the previous publish, can make this skip a
/// changed file. Prefer a content strategy where the target allows it.
///
/// The plain variant stats the target once per file; the caching variant
/// walks it once up front. Both reach the same decisions. Deciding only
/// stats the source; the file is read when it is published.
pub struct MirrorStrategy {
    target: BackendHandle,
    index: RemoteFileIndex,
}

impl MirrorStrategy {
    pub fn plain(target: BackendHandle) -> Self {
        let index = RemoteFileIndex::direct(target.clone(), ComparisonKind::Modified);
        Self { target, index }
    }

    pub async fn caching(target: BackendHandle) -> Result<Self> {
        let index = RemoteFileIndex::preload(target.clone(), ComparisonKind::Modified, None).await?;
        Ok(Self { target, index })
    }
}

#[async_trait]
impl Strategy for MirrorStrategy {
    fn name(&self) -> &'static str {
        if self.index.is_preloaded() { "mirrored-caching" } else { "mirrored-plain" }
    }

    fn kind(&self) -> ComparisonKind {
        ComparisonKind::Modified
    }

    async fn should_copy(&self, file: &LocalFile) -> Result<Checked> {
        let local = ComparisonKey::Modified(file.modified().await?);
        let remote = self.index.lookup(&file.remote_path).await?;
        Ok(Checked::new(decide(&local, &remote)))
    }

    async fn publish(&self, file: &LocalFile, body: Option<Body>) -> Result<()> {
        let body = match body {
            Some(body) => body,
            None => Body::plain(file.read().await?),
        };
        upload(&self.target, file, body).await
    }
}
