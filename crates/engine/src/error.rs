//! Engine Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Storage errors are wrapped (never replaced) so the
//! backend's own reason stays visible in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an engine failure.
///
/// ### Per-file Errors
/// Recorded against the file in the run summary; the run carries on.
/// - [`ErrorKind::Lookup`]
/// - [`ErrorKind::Read`]
/// - [`ErrorKind::Compression`]
/// - [`ErrorKind::Upload`]
/// - [`ErrorKind::ReservedName`]
///
/// ### Fatal Errors
/// - [`ErrorKind::Configuration`] - raised before any file is touched.
/// - [`ErrorKind::Discovery`]
/// - [`ErrorKind::Staging`]
/// - [`ErrorKind::Manifest`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The state of the remote copy could not be determined. Never means
    /// "absent" and never means "present".
    #[display("could not look up remote state of {}", _0.display())]
    Lookup(#[error(not(source))] PathBuf),
    /// The local file could not be read.
    #[display("could not read local file {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("could not compress {}", _0.display())]
    Compression(#[error(not(source))] PathBuf),
    /// A copy was decided on, but the transfer failed.
    #[display("could not upload {}", _0.display())]
    Upload(#[error(not(source))] PathBuf),
    /// A collected file would be overwritten by the generated manifest.
    #[display("{} collides with the manifest name", _0.display())]
    ReservedName(#[error(not(source))] PathBuf),
    /// The selected strategy can't work with the configured backend.
    #[display("invalid strategy configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    /// Local files could not be enumerated.
    #[display("could not discover local files")]
    Discovery,
    /// The two-pass staging area could not be set up or written to.
    #[display("could not stage files for two-pass publishing")]
    Staging,
    /// The manifest could not be built, or was used out of order.
    #[display("manifest error: {_0}")]
    Manifest(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lookup(_) | Self::Upload(_))
    }

    /// Returns `true` for errors that stop a run before it starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
