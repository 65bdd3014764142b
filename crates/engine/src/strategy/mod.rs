//! Copy-or-skip strategies.
//!
//! A strategy is picked once per run from [`Settings`] by a
//! [`StrategyFactory`] and then asked about every file. Each one fixes a
//! single [`ComparisonKind`] for the whole run.

mod hash;
mod mirror;
mod native;

pub use self::hash::HashStrategy;
pub use self::mirror::MirrorStrategy;
pub use self::native::RemoteNativeStrategy;
use crate::error::{ErrorKind, Result};
use crate::file::LocalFile;
use crate::index::RemoteFileIndex;
use crate::key::ComparisonKind;
use crate::policy::Decision;
use async_trait::async_trait;
use collectfast_config::{Settings, StrategyKind};
use collectfast_storage::BackendHandle;
use collectfast_storage::backend::{BackendKind, ContentEncoding};
use exn::ResultExt;
use std::sync::Arc;

/// Bytes as they will be stored on the target.
pub struct Body {
    pub data: Vec<u8>,
    pub encoding: Option<ContentEncoding>,
}

impl Body {
    pub fn plain(data: Vec<u8>) -> Self {
        Self { data, encoding: None }
    }
}

/// What [`Strategy::should_copy`] found out about a file.
///
/// Strategies that had to read the file to compare it keep the prepared
/// [`Body`] here, and get it back in [`Strategy::publish`].
pub struct Checked {
    pub decision: Decision,
    pub body: Option<Body>,
}

impl Checked {
    pub fn new(decision: Decision) -> Self {
        Self { decision, body: None }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }
}

/// Decides whether a file needs copying, and copies it.
///
/// The runner calls [`publish()`](Self::publish) only after
/// [`should_copy()`](Self::should_copy) returned [`Decision::Copy`] for the
/// same file, passing along the body it prepared (if any).
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn kind(&self) -> ComparisonKind;

    async fn should_copy(&self, file: &LocalFile) -> Result<Checked>;

    async fn publish(&self, file: &LocalFile, body: Option<Body>) -> Result<()>;
}

/// Write `body` to `file`'s remote path.
pub(crate) async fn upload(target: &BackendHandle, file: &LocalFile, body: Body) -> Result<()> {
    let path = &file.remote_path;
    let result = match body.encoding {
        Some(encoding) => target.write_encoded(path, &body.data, encoding).await,
        None => target.write(path, &body.data).await,
    };
    result.or_raise(|| ErrorKind::Upload(path.clone()))
}

pub type StrategyHandle = Arc<dyn Strategy>;

/// Builds the strategy for a run.
///
/// The host command receives one of these instead of constructing strategies
/// itself, so it can be swapped out (and counted) in tests.
#[async_trait]
pub trait StrategyFactory: Send + Sync {
    async fn build(&self, settings: &Settings, target: BackendHandle) -> Result<StrategyHandle>;
}

/// Builds the strategy named by [`Settings::strategy`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultStrategyFactory;

impl DefaultStrategyFactory {
    /// Reject combinations that can't work, before anything is touched.
    pub fn check(settings: &Settings, target: BackendKind) -> Result<StrategyKind> {
        let Some(kind) = settings.strategy else {
            exn::bail!(ErrorKind::Configuration("no strategy configured".to_string()));
        };
        let expected = if kind.is_object_storage() { BackendKind::ObjectStorage } else { BackendKind::Filesystem };
        if target != expected {
            exn::bail!(ErrorKind::Configuration(format!(
                "strategy {kind:?} needs a {expected:?} backend, target is {target:?}"
            )));
        }
        if settings.two_pass && !kind.is_object_storage() {
            exn::bail!(ErrorKind::Configuration(format!(
                "strategy {kind:?} can't be used for two-pass publishing"
            )));
        }
        Ok(kind)
    }
}

#[async_trait]
impl StrategyFactory for DefaultStrategyFactory {
    async fn build(&self, settings: &Settings, target: BackendHandle) -> Result<StrategyHandle> {
        let kind = Self::check(settings, target.kind())?;
        tracing::debug!(strategy = ?kind, backend = target.name(), "Building strategy");
        Ok(match kind {
            StrategyKind::Hash => {
                let index = if settings.preload_metadata {
                    RemoteFileIndex::preload(target.clone(), ComparisonKind::Hash, None).await?
                } else {
                    RemoteFileIndex::direct(target.clone(), ComparisonKind::Hash)
                };
                Arc::new(HashStrategy::new(target, index, settings.gzip.clone()))
            },
            StrategyKind::RemoteNative => {
                if settings.preload_metadata {
                    tracing::debug!("Remote-native strategy asks the backend directly; ignoring preload_metadata");
                }
                Arc::new(RemoteNativeStrategy::new(target))
            },
            StrategyKind::MirroredPlain => Arc::new(MirrorStrategy::plain(target)),
            StrategyKind::MirroredCaching => Arc::new(MirrorStrategy::caching(target).await?),
        })
    }
}
