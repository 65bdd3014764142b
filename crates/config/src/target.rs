use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};

/// One directory static files are collected from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Remote directory the source's files are published under.
    #[serde(default)]
    pub prefix: Option<PathBuf>,
}
impl SourceConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(prefix) = &self.prefix
            && !prefix.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            exn::bail!(ErrorKind::Invalid(format!("source prefix `{}` must be a relative path", prefix.display())));
        }
        Ok(())
    }
}

/// Where collected files are published to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    /// A directory on this machine. Relative paths are resolved against the
    /// working directory.
    Local { path: PathBuf },
    /// An S3-compatible bucket.
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
    /// Throwaway in-process storage; useful for trying settings out.
    #[default]
    Memory,
}
