//! Publish collected static files, skipping the ones the target already has.
//!
//! This crate is the host side: it finds the local files, builds the target
//! backend from [`Settings`](collectfast_config::Settings), and either hands
//! everything to the copy-or-skip engine or, with the engine switched off,
//! copies files the plain way.

pub mod collect;
pub mod error;
pub mod target;

pub use crate::collect::{CollectOptions, Command, DefaultSummary, Report, Source};
