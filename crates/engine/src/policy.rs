//! The copy-or-skip decision.
//!
//! Content comparisons (hash, ETag) skip only on exact equality. The
//! modification time comparison is weaker: a remote copy at least as new as
//! the local file is assumed current, which is wrong under clock skew or when
//! a file is rewritten within the same second. Both sides are truncated to
//! whole seconds, since filesystems and object stores disagree on precision.

use crate::key::{ComparisonKey, RemoteLookup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Copy,
    Skip,
}

/// Decide whether `local` needs to be copied over whatever `remote` holds.
///
/// ```
/// use collectfast_engine::{ComparisonKey, Decision, RemoteLookup, decide};
///
/// let local = ComparisonKey::Hash("d41d8cd98f00b204e9800998ecf8427e".to_string());
/// assert_eq!(decide(&local, &RemoteLookup::Absent), Decision::Copy);
/// assert_eq!(decide(&local, &RemoteLookup::Present(local.clone())), Decision::Skip);
/// ```
pub fn decide(local: &ComparisonKey, remote: &RemoteLookup) -> Decision {
    let RemoteLookup::Present(remote) = remote else {
        return Decision::Copy;
    };
    let current = match (local, remote) {
        (ComparisonKey::Hash(local), ComparisonKey::Hash(remote)) => local == remote,
        (ComparisonKey::ETag(local), ComparisonKey::ETag(remote)) => local.trim_matches('"') == remote.trim_matches('"'),
        (ComparisonKey::Modified(local), ComparisonKey::Modified(remote)) => {
            remote.unix_timestamp() >= local.unix_timestamp()
        },
        _ => false,
    };
    if current { Decision::Skip } else { Decision::Copy }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::{Duration, OffsetDateTime};

    fn at(seconds: i64, millis: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(seconds) + Duration::milliseconds(millis)
    }

    fn hash(value: &str) -> ComparisonKey {
        ComparisonKey::Hash(value.to_string())
    }

    fn etag(value: &str) -> ComparisonKey {
        ComparisonKey::ETag(value.to_string())
    }

    #[rstest]
    #[case::hash(hash("abc"))]
    #[case::etag(etag("\"abc\""))]
    #[case::modified(ComparisonKey::Modified(at(100, 0)))]
    fn test_absent_always_copies(#[case] local: ComparisonKey) {
        assert_eq!(decide(&local, &RemoteLookup::Absent), Decision::Copy);
    }

    #[rstest]
    #[case::hash_equal(hash("abc"), hash("abc"), Decision::Skip)]
    #[case::hash_differs(hash("abc"), hash("abd"), Decision::Copy)]
    #[case::etag_equal(etag("\"abc\""), etag("\"abc\""), Decision::Skip)]
    #[case::etag_quotes_ignored(etag("abc"), etag("\"abc\""), Decision::Skip)]
    #[case::etag_differs(etag("\"abc\""), etag("\"abc-2\""), Decision::Copy)]
    #[case::kinds_never_compare(hash("abc"), etag("abc"), Decision::Copy)]
    #[case::hash_vs_modified(hash("abc"), ComparisonKey::Modified(at(100, 0)), Decision::Copy)]
    fn test_content_comparison(#[case] local: ComparisonKey, #[case] remote: ComparisonKey, #[case] expected: Decision) {
        assert_eq!(decide(&local, &RemoteLookup::Present(remote)), expected);
    }

    #[rstest]
    #[case::remote_newer(at(100, 0), at(200, 0), Decision::Skip)]
    #[case::same_instant(at(100, 0), at(100, 0), Decision::Skip)]
    #[case::same_second(at(100, 900), at(100, 100), Decision::Skip)]
    #[case::remote_older(at(200, 0), at(100, 0), Decision::Copy)]
    #[case::one_second_older(at(101, 0), at(100, 999), Decision::Copy)]
    fn test_modified_comparison(#[case] local: OffsetDateTime, #[case] remote: OffsetDateTime, #[case] expected: Decision) {
        let decision = decide(&ComparisonKey::Modified(local), &RemoteLookup::Present(ComparisonKey::Modified(remote)));
        assert_eq!(decision, expected);
    }
}
