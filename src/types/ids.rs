//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! change request's global id where its per-repository number is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A change request number within a repository (the PR number on GitHub).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrNumber(pub u64);

impl fmt::Display for CrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for CrNumber {
    fn from(n: u64) -> Self {
        CrNumber(n)
    }
}

/// The host-wide stable identifier of a change request.
///
/// Unlike [`CrNumber`] this is unique across every repository the host serves,
/// so it keys the reconciliation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRequestId(pub u64);

impl fmt::Display for ChangeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChangeRequestId {
    fn from(n: u64) -> Self {
        ChangeRequestId(n)
    }
}

/// A repository identifier (owner/repo format).
///
/// Serialized as the `"owner/repo"` string so it can appear in configuration
/// files and persisted state without nesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `owner/repo`. Both halves must be non-empty and the repository
    /// part must not contain another slash.
    pub fn parse(s: &str) -> Result<Self, InvalidRepoId> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(RepoId::new(owner, repo))
            }
            _ => Err(InvalidRepoId(s.to_string())),
        }
    }

    /// GitHub treats owner and repository names case-insensitively.
    pub fn same_as(&self, other: &RepoId) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.repo.eq_ignore_ascii_case(&other.repo)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl TryFrom<String> for RepoId {
    type Error = InvalidRepoId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        RepoId::parse(&s)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.to_string()
    }
}

/// Error returned when a repository identifier is not in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid repository id {0:?}: expected owner/repo")]
pub struct InvalidRepoId(pub String);

/// A comment ID on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod cr_number {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_format(n: u64) {
                prop_assert_eq!(format!("{}", CrNumber(n)), format!("#{}", n));
            }

            #[test]
            fn ordering_matches_underlying(a: u64, b: u64) {
                prop_assert_eq!(CrNumber(a).cmp(&CrNumber(b)), a.cmp(&b));
            }
        }
    }

    mod repo_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serializes_as_slash_string(
                owner in "[a-zA-Z][a-zA-Z0-9-]{0,38}",
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let id = RepoId::new(&owner, &repo);
                let json = serde_json::to_string(&id).unwrap();
                prop_assert_eq!(&json, &format!("\"{}/{}\"", owner, repo));
                let parsed: RepoId = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(id, parsed);
            }
        }

        #[test]
        fn parse_rejects_malformed() {
            for bad in ["", "owner", "/repo", "owner/", "a/b/c"] {
                assert!(RepoId::parse(bad).is_err(), "{bad:?} should be rejected");
            }
        }

        #[test]
        fn deserialize_rejects_malformed() {
            let result: Result<RepoId, _> = serde_json::from_str("\"no-slash\"");
            assert!(result.is_err());
        }
    }

    #[test]
    fn change_request_id_works_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ChangeRequestId(17), "x");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"17":"x"}"#);
        let back: std::collections::BTreeMap<ChangeRequestId, String> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&ChangeRequestId(17)).map(String::as_str), Some("x"));
    }
}
