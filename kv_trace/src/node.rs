//! Decoding of stored trie node blobs into their structural shape.
//!
//! Only the outermost layer of a node is looked at: a full node is a list of
//! 17 items (16 children and a value), and a short node is a list of 2 items
//! whose first item is a hex prefix ("compact") encoded path. The flag nibble
//! of that path tells leaves and extensions apart.

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use rlp::Rlp;
use thiserror::Error;

// Use a whole byte for a Nibble just for convenience
/// A Nibble has 4 bits and is stored as `u8`.
pub type Nibble = u8;

/// Number of list items in a full (branch) node.
pub const BRANCH_ITEM_COUNT: usize = 17;

/// Number of list items in a short (leaf or extension) node.
pub const SHORT_NODE_ITEM_COUNT: usize = 2;

// Flag nibble bits of the hex prefix encoding.
const ODD_FLAG: u8 = 0b01;
const LEAF_FLAG: u8 = 0b10;

/// Errors encountered when a value is not a well formed trie node.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum NodeDecodeError {
    /// The blob is not valid RLP.
    #[error("Invalid RLP: {0}")]
    Rlp(#[from] rlp::DecoderError),

    /// The blob is RLP, but not a list.
    #[error("Node encoding is not an RLP list")]
    NotAList,

    /// Bytes follow the outer list.
    #[error("Node encoding has {0} trailing bytes after the outer list")]
    TrailingBytes(usize),

    /// The list is neither a full node nor a short node.
    #[error("Expected a list of 17 or 2 items, found {0}")]
    UnexpectedItemCount(usize),

    /// The first item of a short node is a nested list.
    #[error("The compact path of a short node is not a byte string")]
    CompactPathNotBytes,

    /// The first item of a short node is an empty byte string.
    #[error("The compact path of a short node is empty")]
    EmptyCompactPath,
}

/// A hex prefix encoded path, decoded.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CompactPath {
    /// The path nibbles, with the padding nibble (if any) removed.
    pub nibbles: Vec<Nibble>,
    /// Whether the flag nibble marks the path as terminating in a leaf.
    pub leaf: bool,
}

impl CompactPath {
    /// Decodes a hex prefix byte string.
    ///
    /// The high nibble of the first byte carries the flags: `0x2` marks a
    /// leaf, `0x1` an odd number of nibbles. For odd paths the low nibble of
    /// the first byte is the first path nibble; for even paths it is padding.
    pub fn decode(bytes: &[u8]) -> Result<Self, NodeDecodeError> {
        let (&first, rest) = bytes
            .split_first()
            .ok_or(NodeDecodeError::EmptyCompactPath)?;
        let flags = first >> 4;

        let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
        if flags & ODD_FLAG != 0 {
            nibbles.push(first & 0x0f);
        }

        for b in rest {
            nibbles.push(b >> 4);
            nibbles.push(b & 0x0f);
        }

        Ok(Self {
            nibbles,
            leaf: flags & LEAF_FLAG != 0,
        })
    }
}

/// The structural shape of a stored trie node.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
pub enum NodeShape {
    /// A full node. Its children are not inspected.
    Branch,
    /// A short node whose compact path does not terminate.
    Extension {
        /// Nibbles shared by everything below the child.
        path: Vec<Nibble>,
    },
    /// A short node terminating in a value.
    Leaf {
        /// Remaining key nibbles below the node's position.
        path: Vec<Nibble>,
        /// The payload of the leaf, still RLP encoded.
        value: Bytes,
    },
}

impl NodeShape {
    /// Decodes the outer layer of a node blob.
    pub fn decode(blob: &[u8]) -> Result<Self, NodeDecodeError> {
        let rlp = Rlp::new(blob);
        if !rlp.is_list() {
            return Err(NodeDecodeError::NotAList);
        }

        let info = rlp.payload_info()?;
        let encoded_len = info.header_len + info.value_len;
        if encoded_len < blob.len() {
            return Err(NodeDecodeError::TrailingBytes(blob.len() - encoded_len));
        }

        match rlp.item_count()? {
            BRANCH_ITEM_COUNT => Ok(NodeShape::Branch),
            SHORT_NODE_ITEM_COUNT => Self::decode_short_node(&rlp),
            n => Err(NodeDecodeError::UnexpectedItemCount(n)),
        }
    }

    fn decode_short_node(rlp: &Rlp) -> Result<Self, NodeDecodeError> {
        let key = rlp.at(0)?;
        if !key.is_data() {
            return Err(NodeDecodeError::CompactPathNotBytes);
        }

        let CompactPath { nibbles, leaf } = CompactPath::decode(key.data()?)?;
        match leaf {
            false => Ok(NodeShape::Extension { path: nibbles }),
            true => Ok(NodeShape::Leaf {
                path: nibbles,
                value: Bytes::copy_from_slice(rlp.at(1)?.data()?),
            }),
        }
    }
}
