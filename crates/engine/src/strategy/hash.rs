use crate::error::{ErrorKind, Result};
use crate::file::LocalFile;
use crate::index::RemoteFileIndex;
use crate::key::{ComparisonKey, ComparisonKind};
use crate::policy::decide;
use crate::strategy::{Body, Checked, Strategy, upload};
use async_trait::async_trait;
use collectfast_config::GzipSettings;
use collectfast_storage::BackendHandle;
use collectfast_storage::backend::ContentEncoding;
use exn::ResultExt;
use flate2::{Compression, GzBuilder};
use std::io::Write;
use std::path::Path;

/// Compares the MD5 of a file against the ETag the object store reports.
///
/// With gzip enabled, eligible files are compressed before hashing and
/// uploading. The compression is deterministic (no timestamp, fixed level),
/// so an unchanged file produces an unchanged digest on every run.
pub struct HashStrategy {
    target: BackendHandle,
    index: RemoteFileIndex,
    gzip: GzipSettings,
}

impl HashStrategy {
    pub fn new(target: BackendHandle, index: RemoteFileIndex, gzip: GzipSettings) -> Self {
        Self { target, index, gzip }
    }

    fn should_gzip(&self, path: &Path) -> bool {
        mime_guess::from_path(path)
            .first_raw()
            .is_some_and(|content_type| self.gzip.applies_to(content_type))
    }

    async fn body(&self, file: &LocalFile) -> Result<Body> {
        let data = file.read().await?;
        if !self.should_gzip(&file.remote_path) {
            return Ok(Body::plain(data));
        }
        Ok(Body {
            data: gzip(&data).or_raise(|| ErrorKind::Compression(file.path.clone()))?,
            encoding: Some(ContentEncoding::Gzip),
        })
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

pub(crate) fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[async_trait]
impl Strategy for HashStrategy {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn kind(&self) -> ComparisonKind {
        ComparisonKind::Hash
    }

    async fn should_copy(&self, file: &LocalFile) -> Result<Checked> {
        let body = self.body(file).await?;
        let local = ComparisonKey::Hash(md5_hex(&body.data));
        let remote = self.index.lookup(&file.remote_path).await?;
        let decision = decide(&local, &remote);
        tracing::trace!(path = %file.remote_path.display(), %local, ?remote, ?decision, "Compared content hash");
        Ok(Checked::new(decision).with_body(body))
    }

    async fn publish(&self, file: &LocalFile, body: Option<Body>) -> Result<()> {
        let body = match body {
            Some(body) => body,
            None => self.body(file).await?,
        };
        upload(&self.target, file, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Decision;
    use collectfast_storage::StorageBackend;
    use collectfast_storage::backend::{MemoryBackend, MockBackend, Operation};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Arc;

    fn strategy(target: Arc<MockBackend>, gzip: GzipSettings) -> HashStrategy {
        let index = RemoteFileIndex::direct(target.clone(), ComparisonKind::Hash);
        HashStrategy::new(target, index, gzip)
    }

    fn local(path: &str, data: &[u8]) -> LocalFile {
        let source = Arc::new(MemoryBackend::with_files([(path, data.to_vec())]));
        LocalFile::new(source, path, None).unwrap()
    }

    #[tokio::test]
    async fn test_absent_copies() {
        let target = Arc::new(MockBackend::default());
        let strategy = strategy(target.clone(), GzipSettings::default());
        let file = local("style.css", b"body{}");
        let checked = strategy.should_copy(&file).await.unwrap();
        assert_eq!(checked.decision, Decision::Copy);
        // Gzip is off by default, even for eligible types.
        assert!(checked.body.as_ref().is_some_and(|body| body.encoding.is_none()));
        strategy.publish(&file, checked.body).await.unwrap();
        assert_eq!(target.inner().read(Path::new("style.css")).await.unwrap(), b"body{}");
    }

    #[tokio::test]
    async fn test_copied_file_is_read_once() {
        let gzip = GzipSettings {
            enabled: true,
            ..GzipSettings::default()
        };
        let source = Arc::new(MockBackend::new(MemoryBackend::with_files([("style.css", b"body{}".to_vec())])));
        let file = LocalFile::new(source.clone(), "style.css", None).unwrap();
        let target = Arc::new(MockBackend::default());
        let strategy = strategy(target.clone(), gzip);

        let checked = strategy.should_copy(&file).await.unwrap();
        assert_eq!(checked.decision, Decision::Copy);
        strategy.publish(&file, checked.body).await.unwrap();
        assert_eq!(source.calls(Operation::Read), 1);
        assert_eq!(target.calls(Operation::Write), 1);
    }

    #[tokio::test]
    async fn test_matching_hash_skips() {
        let target = Arc::new(MockBackend::new(MemoryBackend::with_files([("style.css", b"body{}".to_vec())])));
        let strategy = strategy(target.clone(), GzipSettings::default());
        assert_eq!(strategy.should_copy(&local("style.css", b"body{}")).await.unwrap().decision, Decision::Skip);
        assert_eq!(strategy.should_copy(&local("style.css", b"body{ }")).await.unwrap().decision, Decision::Copy);
        assert_eq!(target.calls(Operation::Stat), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_never_skips() {
        let target = Arc::new(
            MockBackend::new(MemoryBackend::with_files([("style.css", b"body{}".to_vec())])).with_failing_lookup("style.css"),
        );
        let strategy = strategy(target, GzipSettings::default());
        let err = strategy.should_copy(&local("style.css", b"body{}")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Lookup(_)));
    }

    #[tokio::test]
    async fn test_gzip_is_deterministic_and_compared() {
        let gzip = GzipSettings {
            enabled: true,
            ..GzipSettings::default()
        };
        let target = Arc::new(MockBackend::default());
        let strategy = strategy(target.clone(), gzip);
        let file = local("css/site.css", b"body { color: red; }");
        let checked = strategy.should_copy(&file).await.unwrap();
        assert_eq!(checked.decision, Decision::Copy);
        assert_eq!(checked.body.as_ref().and_then(|b| b.encoding), Some(ContentEncoding::Gzip));
        strategy.publish(&file, checked.body).await.unwrap();

        let stored = target.inner().read(Path::new("css/site.css")).await.unwrap();
        let mut decoded = String::new();
        GzDecoder::new(stored.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "body { color: red; }");
        // Compressing again yields the same digest, so the next run skips.
        assert_eq!(strategy.should_copy(&file).await.unwrap().decision, Decision::Skip);
    }

    #[tokio::test]
    async fn test_gzip_skips_ineligible_types() {
        let gzip = GzipSettings {
            enabled: true,
            ..GzipSettings::default()
        };
        let target = Arc::new(MockBackend::default());
        let strategy = strategy(target.clone(), gzip);
        let file = local("img/logo.png", b"\x89PNG");
        strategy.publish(&file, None).await.unwrap();
        assert_eq!(target.inner().read(Path::new("img/logo.png")).await.unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let target = Arc::new(MockBackend::default().with_failing_write("style.css"));
        let strategy = strategy(target, GzipSettings::default());
        let err = strategy.publish(&local("style.css", b"body{}"), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upload(_)));
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
