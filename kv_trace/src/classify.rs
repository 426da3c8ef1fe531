//! Maps raw store keys onto the trie namespace they belong to.
//!
//! A path-scheme node database shares one flat keyspace between several
//! logical tables, told apart by a single leading byte. Older hash-scheme
//! nodes have no prefix at all: they are stored under the keccak hash of their
//! own encoding, which can only be confirmed when the value is at hand.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use keccak_hash::keccak;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a keccak-256 digest, and therefore of every hash-addressed key.
pub const HASH_LENGTH: usize = 32;

/// Leading byte of path-scheme account trie node keys (`'A'`).
pub const ACCOUNT_TRIE_NODE_PREFIX: u8 = b'A';

/// Leading byte of path-scheme storage trie node keys (`'O'`).
pub const STORAGE_TRIE_NODE_PREFIX: u8 = b'O';

/// Leading byte of snapshot account entries (`'a'`).
pub const SNAPSHOT_ACCOUNT_PREFIX: u8 = b'a';

/// Leading byte of snapshot storage entries (`'o'`).
pub const SNAPSHOT_STORAGE_PREFIX: u8 = b'o';

/// Node paths are stored one nibble per byte and are always shorter than a
/// full key, since a node at depth 64 is always wrapped in a short node.
const MAX_NODE_PATH_LEN: usize = HASH_LENGTH * 2;

/// The logical keyspace a store key belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Namespace {
    /// Path-scheme account trie node: `'A' ++ path`.
    #[serde(rename = "PATH_ACCOUNT_TRIE")]
    AccountTriePath,
    /// Path-scheme storage trie node: `'O' ++ account_hash ++ path`.
    #[serde(rename = "PATH_STORAGE_TRIE")]
    StorageTriePath,
    /// Flat snapshot account entry: `'a' ++ account_hash`.
    #[serde(rename = "SNAPSHOT_ACCOUNT")]
    SnapshotAccount,
    /// Flat snapshot storage entry: `'o' ++ account_hash ++ slot_hash`.
    #[serde(rename = "SNAPSHOT_STORAGE")]
    SnapshotStorage,
    /// Hash-scheme trie node, stored under `keccak(value)`.
    #[serde(rename = "HASH_TRIE")]
    LegacyHashTrie,
    /// Anything else. Never written to an operation log.
    #[serde(skip)]
    Unclassified,
}

/// Error returned when a log's `Type` column holds an unknown name.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Unknown namespace name: {0:?}")]
pub struct UnknownNamespace(pub String);

impl Namespace {
    /// Every namespace that can appear in a log, in report order.
    pub const CLASSIFIED: [Namespace; 5] = [
        Namespace::AccountTriePath,
        Namespace::StorageTriePath,
        Namespace::LegacyHashTrie,
        Namespace::SnapshotAccount,
        Namespace::SnapshotStorage,
    ];

    /// The name used for this namespace in the `Type` column of a log, or
    /// `None` for [`Namespace::Unclassified`].
    pub const fn wire_name(self) -> Option<&'static str> {
        match self {
            Namespace::AccountTriePath => Some("PATH_ACCOUNT_TRIE"),
            Namespace::StorageTriePath => Some("PATH_STORAGE_TRIE"),
            Namespace::SnapshotAccount => Some("SNAPSHOT_ACCOUNT"),
            Namespace::SnapshotStorage => Some("SNAPSHOT_STORAGE"),
            Namespace::LegacyHashTrie => Some("HASH_TRIE"),
            Namespace::Unclassified => None,
        }
    }

    /// Human readable description, used in summaries.
    pub const fn description(self) -> &'static str {
        match self {
            Namespace::AccountTriePath => "Path-Scheme Account Trie",
            Namespace::StorageTriePath => "Path-Scheme Storage Trie",
            Namespace::SnapshotAccount => "Snapshot Account",
            Namespace::SnapshotStorage => "Snapshot Storage",
            Namespace::LegacyHashTrie => "Hash-Scheme Trie Node",
            Namespace::Unclassified => "Unclassified",
        }
    }

    /// Returns `false` only for [`Namespace::Unclassified`].
    pub const fn is_classified(self) -> bool {
        !matches!(self, Namespace::Unclassified)
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name().unwrap_or("UNCLASSIFIED"))
    }
}

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::CLASSIFIED
            .into_iter()
            .find(|ns| ns.wire_name() == Some(s))
            .ok_or_else(|| UnknownNamespace(s.to_string()))
    }
}

/// One row of the classification table: a predicate over `(key, value)` and
/// the namespace it selects.
#[derive(Clone, Copy)]
pub struct ClassifierRule {
    /// Namespace assigned when `matches` holds.
    pub namespace: Namespace,
    /// Predicate over the key and, when known, the value stored under it.
    pub matches: fn(&[u8], Option<&[u8]>) -> bool,
}

impl fmt::Debug for ClassifierRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierRule")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// The classification table. Rules are tried in order and the first match
/// wins, so prefix rules shadow the hash rule for prefixed 32 byte keys.
pub const CLASSIFIER_RULES: &[ClassifierRule] = &[
    ClassifierRule {
        namespace: Namespace::AccountTriePath,
        matches: is_account_trie_node_key,
    },
    ClassifierRule {
        namespace: Namespace::StorageTriePath,
        matches: is_storage_trie_node_key,
    },
    ClassifierRule {
        namespace: Namespace::SnapshotAccount,
        matches: is_snapshot_account_key,
    },
    ClassifierRule {
        namespace: Namespace::SnapshotStorage,
        matches: is_snapshot_storage_key,
    },
    ClassifierRule {
        namespace: Namespace::LegacyHashTrie,
        matches: is_legacy_trie_node,
    },
];

/// Classifies a key, using the value stored under it when one is known.
///
/// Total and deterministic. An empty key is always
/// [`Namespace::Unclassified`].
pub fn classify(key: &[u8], value: Option<&[u8]>) -> Namespace {
    if key.is_empty() {
        return Namespace::Unclassified;
    }

    CLASSIFIER_RULES
        .iter()
        .find(|rule| (rule.matches)(key, value))
        .map_or(Namespace::Unclassified, |rule| rule.namespace)
}

/// Classifies a key on its own, as needed for deletes.
///
/// Without a value the hash relationship of a legacy node cannot be checked,
/// so any unprefixed key of [`HASH_LENGTH`] bytes is reported as
/// [`Namespace::LegacyHashTrie`]. This is an approximation: other 32 byte
/// keys are misreported the same way.
pub fn classify_key(key: &[u8]) -> Namespace {
    classify(key, None)
}

fn is_account_trie_node_key(key: &[u8], _value: Option<&[u8]>) -> bool {
    key.first() == Some(&ACCOUNT_TRIE_NODE_PREFIX) && key.len() < 1 + MAX_NODE_PATH_LEN
}

fn is_storage_trie_node_key(key: &[u8], _value: Option<&[u8]>) -> bool {
    key.first() == Some(&STORAGE_TRIE_NODE_PREFIX)
        && key.len() >= 1 + HASH_LENGTH
        && key.len() < 1 + HASH_LENGTH + MAX_NODE_PATH_LEN
}

fn is_snapshot_account_key(key: &[u8], _value: Option<&[u8]>) -> bool {
    key.first() == Some(&SNAPSHOT_ACCOUNT_PREFIX)
}

fn is_snapshot_storage_key(key: &[u8], _value: Option<&[u8]>) -> bool {
    key.first() == Some(&SNAPSHOT_STORAGE_PREFIX)
}

fn is_legacy_trie_node(key: &[u8], value: Option<&[u8]>) -> bool {
    if key.len() != HASH_LENGTH {
        return false;
    }

    match value {
        Some(value) => keccak(value).as_bytes() == key,
        None => true,
    }
}
