use crate::error::{ErrorKind, Result};
use crate::file::LocalFile;
use crate::key::{ComparisonKey, ComparisonKind, RemoteLookup};
use crate::policy::decide;
use crate::strategy::hash::md5_hex;
use crate::strategy::{Body, Checked, Strategy, upload};
use async_trait::async_trait;
use collectfast_storage::BackendHandle;
use exn::ResultExt;

/// Leaves the comparison to the object store.
///
/// Each file costs one conditional request
/// ([`digest_matches`](collectfast_storage::StorageBackend::digest_matches))
/// that fuses the lookup and the comparison. A "no" from the backend can't be
/// told apart from a missing object, and both mean copy.
pub struct RemoteNativeStrategy {
    target: BackendHandle,
}

impl RemoteNativeStrategy {
    pub fn new(target: BackendHandle) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Strategy for RemoteNativeStrategy {
    fn name(&self) -> &'static str {
        "remote-native"
    }

    fn kind(&self) -> ComparisonKind {
        ComparisonKind::ETag
    }

    async fn should_copy(&self, file: &LocalFile) -> Result<Checked> {
        let data = file.read().await?;
        let etag = format!("\"{}\"", md5_hex(&data));
        let matches = self
            .target
            .digest_matches(&file.remote_path, &etag)
            .await
            .or_raise(|| ErrorKind::Lookup(file.remote_path.clone()))?;
        let local = ComparisonKey::ETag(etag);
        let remote = if matches { RemoteLookup::Present(local.clone()) } else { RemoteLookup::Absent };
        Ok(Checked::new(decide(&local, &remote)).with_body(Body::plain(data)))
    }

    async fn publish(&self, file: &LocalFile, body: Option<Body>) -> Result<()> {
        let body = match body {
            Some(body) => body,
            None => Body::plain(file.read().await?),
        };
        upload(&self.target, file, body).await
    }
}
