//! The `collectstatic`-style command.
//!
//! Every run starts the same way: find the local files. What happens next
//! depends on the kill switch. With the engine on, a strategy is built from
//! the settings and [`SyncRunner`] decides per file. With it off (in the
//! settings or with `--disable-collectfast`) no strategy is ever built and
//! files go through the plain copy path instead.

use crate::error::{ErrorKind, Result};
use collectfast_config::Settings;
use collectfast_engine::{LocalFile, RunSummary, StrategyFactory, SyncRunner};
use collectfast_storage::BackendHandle;
use collectfast_storage::backend::ReadOnlyBackend;
use exn::ResultExt;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A directory static files are collected from.
#[derive(Clone)]
pub struct Source {
    pub backend: BackendHandle,
    /// Published under this remote directory, if set.
    pub prefix: Option<PathBuf>,
}
impl Source {
    pub fn new(backend: BackendHandle, prefix: Option<PathBuf>) -> Self {
        Self { backend, prefix }
    }
}

/// Per-invocation flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectOptions {
    /// Same as setting `enabled = false` for this run.
    pub disable_collectfast: bool,
    /// Decide as usual, but don't write anything to the target.
    pub dry_run: bool,
}

/// Totals from the plain copy path.
#[derive(Debug, Default)]
pub struct DefaultSummary {
    pub copied: u64,
    pub unmodified: u64,
    pub destination: Option<PathBuf>,
}
impl fmt::Display for DefaultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.copied == 1 { "file" } else { "files" };
        write!(f, "{} static {noun} copied", self.copied)?;
        if let Some(destination) = &self.destination {
            write!(f, " to '{}'", destination.display())?;
        }
        if self.unmodified > 0 {
            write!(f, ", {} unmodified", self.unmodified)?;
        }
        f.write_str(".")
    }
}

/// What a run did.
#[derive(Debug)]
pub enum Report {
    /// The copy-or-skip engine ran.
    Engine(RunSummary),
    /// The engine was switched off.
    Default(DefaultSummary),
}
impl Report {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Engine(summary) => summary.is_success(),
            Self::Default(_) => true,
        }
    }
}
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(summary) => write!(f, "{summary}"),
            Self::Default(summary) => write!(f, "{summary}"),
        }
    }
}

pub struct Command {
    settings: Settings,
    target: BackendHandle,
    factory: Arc<dyn StrategyFactory>,
}

impl Command {
    pub fn new(settings: Settings, target: BackendHandle, factory: Arc<dyn StrategyFactory>) -> Self {
        Self {
            settings,
            target,
            factory,
        }
    }

    pub fn engine_enabled(&self, options: &CollectOptions) -> bool {
        self.settings.enabled && !options.disable_collectfast
    }

    /// Collect every source and publish it to the target.
    ///
    /// # Errors
    /// Configuration problems (including an unusable strategy) are returned
    /// before any file is published. Per-file failures don't end the run;
    /// they are counted in the [`Report`].
    pub async fn collect(&self, sources: &[Source], options: CollectOptions) -> Result<Report> {
        let target: BackendHandle = if options.dry_run {
            Arc::new(ReadOnlyBackend::new(self.target.clone()))
        } else {
            self.target.clone()
        };

        if !self.engine_enabled(&options) {
            tracing::info!(backend = target.name(), "Collectfast disabled, copying the default way");
            let files = discover(sources).await?;
            return Ok(Report::Default(default_copy(&target, files).await?));
        }

        let strategy = self.factory.build(&self.settings, target.clone()).await.or_raise(|| ErrorKind::Strategy)?;
        tracing::info!(strategy = strategy.name(), backend = target.name(), dry_run = options.dry_run, "Publishing");
        let files = discover(sources).await?;
        let summary = SyncRunner::new(strategy, &self.settings).run(files).await.or_raise(|| ErrorKind::Publish)?;
        Ok(Report::Engine(summary))
    }
}

/// Enumerate all sources in order. When two sources provide the same remote
/// path, the earlier source wins.
pub async fn discover(sources: &[Source]) -> Result<Vec<LocalFile>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for source in sources {
        let found = LocalFile::discover(source.backend.clone(), source.prefix.as_deref())
            .await
            .or_raise(|| ErrorKind::Discovery)?;
        for file in found {
            if seen.insert(file.remote_path.clone()) {
                files.push(file);
            } else {
                tracing::debug!(path = %file.remote_path.display(), source = source.backend.name(), "Found another file with the same destination; ignoring");
            }
        }
    }
    Ok(files)
}

/// Copy each file unless the target's copy is at least as new (to the
/// second). Stops at the first error.
async fn default_copy(target: &BackendHandle, files: Vec<LocalFile>) -> Result<DefaultSummary> {
    let mut summary = DefaultSummary {
        destination: target.location().map(|p| p.to_path_buf()),
        ..DefaultSummary::default()
    };
    for file in files {
        let local = file.modified().await.or_raise(|| ErrorKind::Publish)?;
        let current = match target.stat(&file.remote_path).await {
            Ok(remote) => remote.modified.unix_timestamp() >= local.unix_timestamp(),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e).or_raise(|| ErrorKind::Publish),
        };
        if current {
            tracing::debug!(path = %file.remote_path.display(), "Skipping unmodified");
            summary.unmodified += 1;
            continue;
        }
        let data = file.read().await.or_raise(|| ErrorKind::Publish)?;
        target.write(&file.remote_path, &data).await.or_raise(|| ErrorKind::Publish)?;
        tracing::debug!(path = %file.remote_path.display(), "Copied");
        summary.copied += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use collectfast_config::StrategyKind;
    use collectfast_engine::{DefaultStrategyFactory, StrategyHandle};
    use collectfast_storage::backend::{LocalBackend, MemoryBackend, MockBackend, Operation};
    use rstest::rstest;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stands in for strategy loading and counts how often it's asked.
    #[derive(Default)]
    struct CountingFactory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StrategyFactory for CountingFactory {
        async fn build(&self, settings: &Settings, target: BackendHandle) -> collectfast_engine::error::Result<StrategyHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DefaultStrategyFactory.build(settings, target).await
        }
    }

    fn sources(files: &[(&str, &str)]) -> Vec<Source> {
        let backend = MemoryBackend::with_files(files.iter().map(|(p, d)| (*p, d.as_bytes().to_vec())));
        vec![Source::new(Arc::new(backend), None)]
    }

    fn hash_settings() -> Settings {
        Settings {
            strategy: Some(StrategyKind::Hash),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_by_setting_never_loads_strategy() {
        let factory = Arc::new(CountingFactory::default());
        let settings = Settings {
            enabled: false,
            ..hash_settings()
        };
        let command = Command::new(settings, Arc::new(MockBackend::default()), factory.clone());
        let report = command.collect(&sources(&[("style.css", "body{}")]), CollectOptions::default()).await.unwrap();
        assert!(matches!(report, Report::Default(_)));
        assert_eq!(report.to_string(), "1 static file copied.");
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_by_flag_never_loads_strategy() {
        let factory = Arc::new(CountingFactory::default());
        let command = Command::new(hash_settings(), Arc::new(MockBackend::default()), factory.clone());
        let options = CollectOptions {
            disable_collectfast: true,
            ..CollectOptions::default()
        };
        let report = command.collect(&sources(&[("style.css", "body{}")]), options).await.unwrap();
        assert_eq!(report.to_string(), "1 static file copied.");
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enabled_loads_strategy_once() {
        let factory = Arc::new(CountingFactory::default());
        let target = Arc::new(MockBackend::default());
        let command = Command::new(hash_settings(), target.clone(), factory.clone());
        let sources = sources(&[("style.css", "body{}")]);

        let first = command.collect(&sources, CollectOptions::default()).await.unwrap();
        assert_eq!(first.to_string(), "1 static file copied.");
        let second = command.collect(&sources, CollectOptions::default()).await.unwrap();
        assert_eq!(second.to_string(), "0 static files copied, 1 unmodified.");
        assert!(second.is_success());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let target = Arc::new(MockBackend::default());
        let command = Command::new(hash_settings(), target.clone(), Arc::new(DefaultStrategyFactory));
        let options = CollectOptions {
            dry_run: true,
            ..CollectOptions::default()
        };
        let report = command.collect(&sources(&[("style.css", "body{}")]), options).await.unwrap();
        assert_eq!(report.to_string(), "1 static file copied.");
        assert!(target.inner().is_empty().await);
        assert_eq!(target.calls(Operation::Write), 0);
    }

    #[tokio::test]
    async fn test_incompatible_strategy_fails_before_any_file() {
        let target = Arc::new(MockBackend::default());
        let settings = Settings {
            strategy: Some(StrategyKind::MirroredPlain),
            ..Settings::default()
        };
        let command = Command::new(settings, target.clone(), Arc::new(DefaultStrategyFactory));
        let err = command.collect(&sources(&[("style.css", "body{}")]), CollectOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Strategy));
        assert_eq!(target.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let target = Arc::new(MockBackend::default().with_failing_write("broken.css"));
        let command = Command::new(hash_settings(), target, Arc::new(DefaultStrategyFactory));
        let report = command
            .collect(&sources(&[("broken.css", "a"), ("fine.css", "b")]), CollectOptions::default())
            .await
            .unwrap();
        assert_eq!(report.to_string(), "1 static file copied, 1 failed.");
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_default_path_reports_destination() {
        let dir = tempfile::tempdir().unwrap();
        let target: BackendHandle = Arc::new(LocalBackend::new("target", dir.path()).unwrap());
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        let command = Command::new(settings, target, Arc::new(DefaultStrategyFactory));
        let sources = sources(&[("css/site.css", "body{}"), ("js/app.js", "let a;")]);

        let first = command.collect(&sources, CollectOptions::default()).await.unwrap();
        assert_eq!(first.to_string(), format!("2 static files copied to '{}'.", dir.path().display()));
        assert!(dir.path().join("css/site.css").is_file());
        let second = command.collect(&sources, CollectOptions::default()).await.unwrap();
        assert_eq!(second.to_string(), format!("0 static files copied to '{}', 2 unmodified.", dir.path().display()));
    }

    #[rstest]
    #[case(0, 0, None, "0 static files copied.")]
    #[case(1, 0, None, "1 static file copied.")]
    #[case(1, 2, Some("/srv/static"), "1 static file copied to '/srv/static', 2 unmodified.")]
    #[case(0, 3, None, "0 static files copied, 3 unmodified.")]
    fn test_default_summary(
        #[case] copied: u64,
        #[case] unmodified: u64,
        #[case] destination: Option<&str>,
        #[case] expected: &str,
    ) {
        let summary = DefaultSummary {
            copied,
            unmodified,
            destination: destination.map(PathBuf::from),
        };
        assert_eq!(summary.to_string(), expected);
    }

    #[tokio::test]
    async fn test_first_source_wins() {
        let app = MemoryBackend::with_files([("css/site.css", b"app".to_vec())]);
        let vendor = MemoryBackend::with_files([("css/site.css", b"vendor".to_vec()), ("lib.js", b"v".to_vec())]);
        let sources = vec![
            Source::new(Arc::new(app), None),
            Source::new(Arc::new(vendor), None),
        ];
        let files = discover(&sources).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].read().await.unwrap(), b"app");
    }

    #[tokio::test]
    async fn test_prefixed_sources_do_not_collide() {
        let app = MemoryBackend::with_files([("site.css", b"app".to_vec())]);
        let admin = MemoryBackend::with_files([("site.css", b"admin".to_vec())]);
        let sources = vec![
            Source::new(Arc::new(app), None),
            Source::new(Arc::new(admin), Some(PathBuf::from("admin"))),
        ];
        let files = discover(&sources).await.unwrap();
        let remote: Vec<_> = files.iter().map(|f| f.remote_path.as_path()).collect();
        assert_eq!(remote, vec![Path::new("site.css"), Path::new("admin/site.css")]);
    }
}
