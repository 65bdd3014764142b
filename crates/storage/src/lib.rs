pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::{BackendKind, ContentEncoding, StorageBackend};
pub use crate::models::FileInfo;
pub use crate::path::{join_prefix, to_key, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
