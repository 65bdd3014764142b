//! Command Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Settings could not be loaded.
    #[display("could not load configuration")]
    Config,
    /// A source directory is missing or unusable.
    #[display("invalid source directory: {}", _0.display())]
    Source(#[error(not(source))] PathBuf),
    /// The target backend could not be set up.
    #[display("could not set up target storage")]
    Target,
    #[display("could not discover static files")]
    Discovery,
    /// The strategy could not be built from the settings.
    #[display("could not load strategy")]
    Strategy,
    /// Publishing stopped with a fatal error.
    #[display("could not publish static files")]
    Publish,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Publish)
    }
}
