//! Turns configuration into storage backends.

use crate::collect::Source;
use crate::error::{ErrorKind, Result};
use collectfast_config::{SourceConfig, TargetConfig};
use collectfast_storage::BackendHandle;
use collectfast_storage::backend::{LocalBackend, MemoryBackend};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;

/// Build the backend files are published to. Relative paths are resolved
/// against `cwd`.
pub async fn build(config: &TargetConfig, cwd: &Path) -> Result<BackendHandle> {
    Ok(match config {
        TargetConfig::Local { path } => {
            let root = cwd.join(path);
            tracing::debug!(root = %root.display(), "Using local target");
            Arc::new(LocalBackend::new("target", &root).or_raise(|| ErrorKind::Target)?)
        },
        TargetConfig::Memory => {
            tracing::warn!("Publishing to memory; nothing will persist after this run");
            Arc::new(MemoryBackend::default().with_name("target"))
        },
        #[cfg(feature = "s3")]
        TargetConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            key_id,
            key_secret,
        } => Arc::new(
            collectfast_storage::backend::S3Backend::new(
                "target",
                bucket,
                prefix.clone(),
                region,
                endpoint.clone(),
                key_id,
                key_secret,
            )
            .await
            .or_raise(|| ErrorKind::Target)?,
        ),
        #[cfg(not(feature = "s3"))]
        TargetConfig::S3 { .. } => {
            tracing::error!("S3 targets need the `s3` feature");
            exn::bail!(ErrorKind::Target);
        },
    })
}

/// Open every configured source directory. Unlike the target, a source
/// directory must already exist.
pub fn sources(configs: &[SourceConfig], cwd: &Path) -> Result<Vec<Source>> {
    configs
        .iter()
        .map(|config| -> Result<Source> {
            let root = cwd.join(&config.path);
            if !root.is_dir() {
                exn::bail!(ErrorKind::Source(root));
            }
            let backend = LocalBackend::new(root.display().to_string(), &root).or_raise(|| ErrorKind::Source(root.clone()))?;
            Ok(Source::new(Arc::new(backend), config.prefix.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use collectfast_storage::backend::BackendKind;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_local_target_is_resolved_and_created() {
        let cwd = tempfile::tempdir().unwrap();
        let config = TargetConfig::Local {
            path: PathBuf::from("public/static"),
        };
        let backend = build(&config, cwd.path()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Filesystem);
        assert_eq!(backend.location(), Some(cwd.path().join("public/static").as_path()));
        assert!(cwd.path().join("public/static").is_dir());
    }

    #[tokio::test]
    async fn test_memory_target() {
        let backend = build(&TargetConfig::Memory, Path::new("/")).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::ObjectStorage);
        assert_eq!(backend.location(), None);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(cwd.path().join("static")).unwrap();
        let configs = vec![SourceConfig {
            path: PathBuf::from("static"),
            prefix: Some(PathBuf::from("app")),
        }];
        let sources = sources(&configs, cwd.path()).unwrap();
        assert_eq!(sources[0].prefix.as_deref(), Some(Path::new("app")));

        let configs = vec![SourceConfig {
            path: PathBuf::from("missing"),
            prefix: None,
        }];
        let err = super::sources(&configs, cwd.path()).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Source(_)));
    }
}
