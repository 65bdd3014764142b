//! Decides, file by file, whether a static asset needs publishing.
//!
//! The pieces, leaves first:
//!
//! - [`RemoteFileIndex`] asks the target what it holds at a path, either one
//!   call at a time or from a single up-front listing.
//! - [`decide`] turns a local [`ComparisonKey`] and a [`RemoteLookup`] into a
//!   [`Decision`].
//! - A [`Strategy`] combines the two for one file and publishes it when
//!   told to. [`DefaultStrategyFactory`] picks one from the settings.
//! - [`ManifestResolver`] stages content-hashed copies and a manifest for
//!   two-pass publishing.
//! - [`SyncRunner`] drives a strategy over every file with bounded
//!   concurrency and totals the outcomes in a [`RunSummary`].

pub mod error;
mod file;
mod index;
mod key;
mod manifest;
mod policy;
mod runner;
pub mod strategy;
mod summary;

pub use crate::file::LocalFile;
pub use crate::index::RemoteFileIndex;
pub use crate::key::{ComparisonKey, ComparisonKind, RemoteLookup};
pub use crate::manifest::{ManifestMapping, ManifestResolver, Phase, hashed_name};
pub use crate::policy::{Decision, decide};
pub use crate::runner::{SyncEvent, SyncRunner};
pub use crate::strategy::{Body, Checked, DefaultStrategyFactory, Strategy, StrategyFactory, StrategyHandle};
pub use crate::summary::{Failure, Outcome, RunSummary};
