//! Configuration loading and validation.
//!
//! Settings are layered with [`figment`]: built-in defaults, then a config
//! file (TOML, YAML or JSON, picked by extension), then `COLLECTFAST_*`
//! environment variables (nested keys separated by `__`, e.g.
//! `COLLECTFAST_GZIP__ENABLED=true`). The result is a plain [`Settings`]
//! value that gets passed to whatever needs it; nothing reads configuration
//! from global state.

pub mod error;
mod settings;
mod target;

pub use crate::settings::{DEFAULT_GZIP_CONTENT_TYPES, DEFAULT_MANIFEST_NAME, DEFAULT_THREADS, GzipSettings, Settings, Staging, StrategyKind};
pub use crate::target::{SourceConfig, TargetConfig};
