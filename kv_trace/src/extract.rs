//! Filtering a log down to its account-trie leaves.
//!
//! A path-scheme account trie node is stored under `'A' ++ path`, where the
//! path holds one nibble per byte. The leaves are the only nodes carrying
//! account data, so the records that write or read them form the minimal
//! ("baseline") working set of the trie.

use ethereum_types::{H256, U256};
use rlp_derive::{RlpDecodable, RlpEncodable};
use thiserror::Error;

use crate::{
    classify::{Namespace, HASH_LENGTH},
    node::{Nibble, NodeDecodeError, NodeShape},
    record::OperationRecord,
};

/// Number of nibbles in a full account key.
const ACCOUNT_PATH_NIBBLES: usize = HASH_LENGTH * 2;

/// Whether a record is an account-trie operation whose value is a leaf node.
///
/// Values that fail to decode are not leaves.
pub fn is_account_leaf(record: &OperationRecord) -> bool {
    record.namespace() == Namespace::AccountTriePath
        && record
            .value()
            .is_some_and(|value| NodeShape::decode(value).is_ok_and(|node| node.is_leaf()))
}

/// Keeps the records for which [`is_account_leaf`] holds, in order.
///
/// Lazy and stateless, so extracting from an already extracted stream yields
/// the same stream.
pub fn extract_leaves<I>(records: I) -> impl Iterator<Item = OperationRecord>
where
    I: IntoIterator<Item = OperationRecord>,
{
    records.into_iter().filter(is_account_leaf)
}

/// Keeps every account-trie record, leaves or not.
pub fn account_trie_records<I>(records: I) -> impl Iterator<Item = OperationRecord>
where
    I: IntoIterator<Item = OperationRecord>,
{
    records
        .into_iter()
        .filter(|r| r.namespace() == Namespace::AccountTriePath)
}

/// An account as stored in a state trie leaf.
#[derive(RlpEncodable, RlpDecodable, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AccountRlp {
    /// Transaction count.
    pub nonce: U256,
    /// Balance in wei.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: H256,
    /// Hash of the account's code.
    pub code_hash: H256,
}

/// Errors encountered when decoding an account out of a leaf record.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AccountLeafError {
    /// The record is not in the account trie.
    #[error("Record is in {0}, not the account trie")]
    NotAccountTrie(Namespace),

    /// The record carries no value.
    #[error("Record has no value")]
    MissingValue,

    /// The value is not a trie node.
    #[error(transparent)]
    Node(#[from] NodeDecodeError),

    /// The value is a branch or extension node.
    #[error("Node is not a leaf")]
    NotALeaf,

    /// A byte of the stored path is not a nibble.
    #[error("Path byte {0:#04x} is not a nibble")]
    InvalidNibble(u8),

    /// The stored path and the leaf path do not add up to a full key.
    #[error("Leaf path has {0} nibbles, expected 64")]
    PathLength(usize),

    /// The leaf payload is not an account.
    #[error("Leaf payload is not an account: {0}")]
    Account(rlp::DecoderError),
}

/// An account recovered from a leaf record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccountLeaf {
    /// The hashed address, i.e. the full trie key of the account.
    pub account_hash: H256,
    /// The decoded account.
    pub account: AccountRlp,
}

impl AccountLeaf {
    /// Decodes the account stored by a leaf record.
    ///
    /// The account hash is the node path from the store key followed by the
    /// remaining path in the leaf itself.
    pub fn decode(record: &OperationRecord) -> Result<Self, AccountLeafError> {
        if record.namespace() != Namespace::AccountTriePath {
            return Err(AccountLeafError::NotAccountTrie(record.namespace()));
        }

        let value = record.value().ok_or(AccountLeafError::MissingValue)?;
        let (leaf_path, payload) = NodeShape::decode(value)?
            .into_leaf()
            .map_err(|_| AccountLeafError::NotALeaf)?;

        let mut nibbles = record
            .key()
            .iter()
            .skip(1)
            .map(|&b| match b < 16 {
                true => Ok(b),
                false => Err(AccountLeafError::InvalidNibble(b)),
            })
            .collect::<Result<Vec<Nibble>, _>>()?;
        nibbles.extend(leaf_path);

        Ok(Self {
            account_hash: nibbles_to_hash(&nibbles)?,
            account: rlp::decode(&payload).map_err(AccountLeafError::Account)?,
        })
    }
}

fn nibbles_to_hash(nibbles: &[Nibble]) -> Result<H256, AccountLeafError> {
    if nibbles.len() != ACCOUNT_PATH_NIBBLES {
        return Err(AccountLeafError::PathLength(nibbles.len()));
    }

    let mut hash = H256::zero();
    for (byte, pair) in hash.0.iter_mut().zip(nibbles.chunks_exact(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }

    Ok(hash)
}
