use crate::error::Result;
use crate::file::LocalFile;
use crate::manifest::ManifestResolver;
use crate::policy::Decision;
use crate::strategy::{Checked, Strategy, StrategyHandle};
use crate::summary::{Failure, Outcome, RunSummary};
use async_stream::stream;
use collectfast_config::{Settings, Staging};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;

/// Progress events emitted by [`SyncRunner::sync`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Resolved`](Self::Resolved): two-pass runs only, once per resolved
///    file. Files that fail to resolve are reported as
///    [`Processed`](Self::Processed) failures instead.
/// 3. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of files about to be published.
/// 4. [`Processed`](Self::Processed): once per file.
/// 5. [`Aborted`](Self::Aborted): at most once, when `fail_fast` left files
///    unscheduled.
/// 6. [`Complete`](Self::Complete): exactly once.
///
/// An `Err` item (staging or manifest failure) ends the stream early, in
/// which case [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum SyncEvent {
    Started,
    Resolved { original: PathBuf, hashed: PathBuf },
    DiscoveryComplete(u64),
    Processed(Outcome),
    /// Number of files that were never scheduled.
    Aborted(u64),
    Complete,
}

/// Runs a strategy over a set of local files.
pub struct SyncRunner {
    strategy: StrategyHandle,
    threads: usize,
    fail_fast: bool,
    two_pass: Option<(Staging, PathBuf)>,
}

impl SyncRunner {
    pub fn new(strategy: StrategyHandle, settings: &Settings) -> Self {
        Self {
            strategy,
            threads: settings.threads.max(1),
            fail_fast: settings.fail_fast,
            two_pass: settings.two_pass.then(|| (settings.staging, settings.manifest_name.clone())),
        }
    }

    pub fn strategy(&self) -> &StrategyHandle {
        &self.strategy
    }

    /// Streams [`SyncEvent`]s while deciding on, and publishing, every file.
    ///
    /// Files sharing a remote path are published once; the first one wins.
    /// Up to `threads` files are in flight at a time and more are promoted
    /// as they complete. Per-file failures are reported as
    /// [`Outcome::Failed`] without ending the stream.
    pub fn sync(&self, files: Vec<LocalFile>) -> impl Stream<Item = Result<SyncEvent>> + '_ {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(SyncEvent::Started);
            let mut files = dedup(files);

            // Holds the staging area open until the last upload is done.
            let mut _resolver = None;
            if let Some((staging, manifest_name)) = &self.two_pass {
                let mut resolver = match ManifestResolver::new(*staging, manifest_name.clone()) {
                    Ok(resolver) => resolver,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                let mut remaining = files.len();
                for file in &files {
                    remaining -= 1;
                    match resolver.resolve(file).await {
                        Ok(hashed) => yield Ok(SyncEvent::Resolved { original: file.remote_path.clone(), hashed }),
                        Err(error) => {
                            tracing::warn!(path = %file.remote_path.display(), %error, "Could not resolve hashed name");
                            yield Ok(SyncEvent::Processed(Outcome::Failed(Failure::new(file.remote_path.clone(), error))));
                            if self.fail_fast {
                                // A partial manifest must never be published.
                                yield Ok(SyncEvent::Aborted(u64::try_from(remaining).unwrap_or(0)));
                                yield Ok(SyncEvent::Complete);
                                return;
                            }
                        },
                    }
                }
                files = match resolver.finish().await {
                    Ok(staged) => dedup(staged),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                _resolver = Some(resolver);
            }
            // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
            yield Ok(SyncEvent::DiscoveryComplete(u64::try_from(files.len()).unwrap_or(0)));

            let strategy = self.strategy.as_ref();
            let mut pending = files.into_iter().map(|file| process(strategy, file));
            let mut processing = FuturesUnordered::new();
            processing.extend(pending.by_ref().take(self.threads));
            let mut stopped = false;
            while let Some(outcome) = processing.next().await {
                if self.fail_fast && !stopped && matches!(outcome, Outcome::Failed(_)) {
                    tracing::warn!(in_flight = processing.len(), "Stopping after first failure");
                    stopped = true;
                }
                yield Ok(SyncEvent::Processed(outcome));
                // Pop-n-push, FIFO.
                if !stopped && let Some(next) = pending.next() {
                    processing.push(next);
                }
            }
            if stopped && pending.len() > 0 {
                yield Ok(SyncEvent::Aborted(u64::try_from(pending.len()).unwrap_or(0)));
            }

            yield Ok(SyncEvent::Complete);
        })
    }

    /// Run to completion and total up the outcomes.
    ///
    /// # Errors
    /// Only fatal errors (staging, manifest) are returned; per-file failures
    /// end up in [`RunSummary::failures`].
    pub async fn run(&self, files: Vec<LocalFile>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut events = std::pin::pin!(self.sync(files));
        while let Some(event) = events.next().await {
            match event? {
                SyncEvent::Processed(outcome) => summary.record(outcome),
                SyncEvent::Aborted(_) => summary.aborted = true,
                _ => {},
            }
        }
        Ok(summary)
    }
}

fn dedup(files: Vec<LocalFile>) -> Vec<LocalFile> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|file| {
            let first = seen.insert(file.remote_path.clone());
            if !first {
                tracing::debug!(path = %file.remote_path.display(), source = file.source.name(), "Ignoring duplicate");
            }
            first
        })
        .collect()
}

async fn process(strategy: &dyn Strategy, file: LocalFile) -> Outcome {
    let path = file.remote_path.clone();
    match decide_and_publish(strategy, &file).await {
        Ok(Decision::Copy) => {
            tracing::info!(path = %path.display(), strategy = strategy.name(), "Copied");
            Outcome::Copied(path)
        },
        Ok(Decision::Skip) => {
            tracing::debug!(path = %path.display(), strategy = strategy.name(), "Skipping unmodified");
            Outcome::Skipped(path)
        },
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "Failed to publish");
            Outcome::Failed(Failure::new(path, error))
        },
    }
}

async fn decide_and_publish(strategy: &dyn Strategy, file: &LocalFile) -> Result<Decision> {
    let Checked { decision, body } = strategy.should_copy(file).await?;
    if decision == Decision::Copy {
        strategy.publish(file, body).await?;
    }
    Ok(decision)
}
