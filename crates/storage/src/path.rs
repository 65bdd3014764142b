//! Path validation and key normalization.
//!
//! Every path handed to a backend is relative to that backend's root. Local
//! files and remote objects share the same normalized form so that a local
//! `css/app.css` and the remote key `css/app.css` compare equal.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// `.` components, repeated separators and trailing slashes are dropped and
/// `..` is resolved, as long as it never climbs above the storage root.
///
/// > **Note:** This does **not** normalize backslashes or non-UTF8 bytes.
/// >           Null bytes are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use collectfast_storage::validate_path;
/// assert!(validate_path("css/style.css").is_ok());
/// assert!(validate_path("admin/../app.js").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("js/../img/.//logo.svg/").unwrap(),
///     Path::new("img/logo.svg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

/// Joins an optional prefix (e.g. a `STATICFILES_DIRS`-style namespace) onto
/// a relative path, validating the result.
///
/// ```
/// use std::path::Path;
/// use collectfast_storage::join_prefix;
/// assert_eq!(join_prefix(Some("vendor/"), "jquery.js").unwrap(), Path::new("vendor/jquery.js"));
/// assert_eq!(join_prefix(None::<&str>, "jquery.js").unwrap(), Path::new("jquery.js"));
/// ```
pub fn join_prefix(prefix: Option<impl AsRef<Path>>, path: impl AsRef<Path>) -> Result<PathBuf> {
    match prefix {
        Some(prefix) => validate(prefix.as_ref().join(path.as_ref())),
        None => validate(path),
    }
}

/// Renders a validated path as an object-store key (always `/` separated).
pub fn to_key(path: &Path) -> Result<String> {
    let validated = validate(path)?;
    let mut parts = Vec::new();
    for component in validated.components() {
        match component.as_os_str().to_str() {
            Some(part) => parts.push(part),
            None => exn::bail!(ErrorKind::InvalidPath(validated.clone())),
        }
    }
    Ok(parts.join("/"))
}
