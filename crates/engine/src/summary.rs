use crate::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// A file that could not be published, and why.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub error: Error,
}
impl Failure {
    pub fn new(path: impl Into<PathBuf>, error: Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// What happened to one file.
#[derive(Debug)]
pub enum Outcome {
    Copied(PathBuf),
    /// The target already held a current copy.
    Skipped(PathBuf),
    Failed(Failure),
}
impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Copied(path) | Self::Skipped(path) => path,
            Self::Failed(failure) => &failure.path,
        }
    }
}

/// Totals for a run.
///
/// Renders as the familiar one-line summary:
///
/// ```
/// use collectfast_engine::RunSummary;
///
/// let summary = RunSummary { copied: 1, skipped: 3, ..RunSummary::default() };
/// assert_eq!(summary.to_string(), "1 static file copied, 3 unmodified.");
/// ```
#[derive(Debug, Default)]
pub struct RunSummary {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failures: Vec<Failure>,
    /// Set when a failure stopped the run before every file was scheduled.
    pub aborted: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Copied(_) => self.copied += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.copied == 1 { "file" } else { "files" };
        write!(f, "{} static {noun} copied", self.copied)?;
        if self.skipped > 0 {
            write!(f, ", {} unmodified", self.skipped)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        f.write_str(".")
    }
}
