//! Comparison keys and remote lookup results.

use collectfast_storage::FileInfo;
use std::fmt;
use time::OffsetDateTime;

/// The value a strategy compares to decide whether a remote copy is stale.
///
/// Keys of different kinds are never equal; each strategy fixes one
/// [`ComparisonKind`] for its whole run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonKey {
    /// Hex content digest (MD5), without quotes.
    Hash(String),
    /// Opaque revision token reported by an object store.
    ETag(String),
    /// Last modification time.
    Modified(OffsetDateTime),
}
impl ComparisonKey {
    pub fn kind(&self) -> ComparisonKind {
        match self {
            Self::Hash(_) => ComparisonKind::Hash,
            Self::ETag(_) => ComparisonKind::ETag,
            Self::Modified(_) => ComparisonKind::Modified,
        }
    }
}
impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "hash:{hash}"),
            Self::ETag(etag) => write!(f, "etag:{etag}"),
            Self::Modified(modified) => write!(f, "modified:{}", modified.unix_timestamp()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonKind {
    Hash,
    ETag,
    Modified,
}
impl ComparisonKind {
    /// Pull a key of this kind out of remote metadata.
    ///
    /// Returns `None` when the metadata carries nothing usable: filesystems
    /// have no ETag, and a multipart upload's ETag is not a content digest.
    pub fn key_from(&self, info: &FileInfo) -> Option<ComparisonKey> {
        match self {
            Self::Hash => {
                let etag = info.etag.as_deref()?.trim_matches('"');
                is_md5_hex(etag).then(|| ComparisonKey::Hash(etag.to_ascii_lowercase()))
            },
            Self::ETag => info.etag.clone().map(ComparisonKey::ETag),
            Self::Modified => Some(ComparisonKey::Modified(info.modified)),
        }
    }
}

fn is_md5_hex(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// What a [`RemoteFileIndex`](crate::RemoteFileIndex) knows about one remote
/// path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteLookup {
    Absent,
    Present(ComparisonKey),
}
