//! Classified operation records and the six column rows they are logged as.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{classify, classify_key, Namespace, UnknownNamespace};

/// Column names of an operation log, in order.
pub const LOG_COLUMNS: [&str; 6] = [
    "Operation",
    "KeyHex",
    "ValueHex",
    "KeySize",
    "ValueSize",
    "Type",
];

/// The store operation a record describes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpKind {
    /// A read that found a value.
    Get,
    /// A write.
    Put,
    /// A point delete.
    Delete,
    /// A batched `[start, end)` delete, logged once for the whole range.
    DeleteRange,
}

impl OpKind {
    /// The name used in the `Operation` column of a log.
    pub const fn wire_name(self) -> &'static str {
        match self {
            OpKind::Get => "GET",
            OpKind::Put => "PUT",
            OpKind::Delete => "DELETE",
            OpKind::DeleteRange => "DELETE_RANGE",
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for OpKind {
    type Err = RecordDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(OpKind::Get),
            "PUT" => Ok(OpKind::Put),
            "DELETE" => Ok(OpKind::Delete),
            "DELETE_RANGE" => Ok(OpKind::DeleteRange),
            _ => Err(RecordDecodeError::UnknownOperation(s.to_string())),
        }
    }
}

/// Errors encountered when turning a [`LogRow`] into an [`OperationRecord`].
#[derive(Debug, Error)]
pub enum RecordDecodeError {
    /// The `Operation` column holds an unknown name.
    #[error("Unknown operation: {0:?}")]
    UnknownOperation(String),

    /// A hex column could not be decoded.
    #[error("Column {column} is not valid hex: {source}")]
    InvalidHex {
        /// Name of the offending column.
        column: &'static str,
        /// The underlying decoding error.
        source: hex::FromHexError,
    },

    /// A size column is not a decimal number.
    #[error("Column {column} is not a byte count: {value:?}")]
    InvalidSize {
        /// Name of the offending column.
        column: &'static str,
        /// The raw column text.
        value: String,
    },

    /// The `Type` column holds an unknown name.
    #[error(transparent)]
    Namespace(#[from] UnknownNamespace),
}

/// Decodes a hex string, with or without a leading `0x`.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(digits)
}

/// One classified store operation.
///
/// Records are built once, when the operation is issued (or its batch is
/// committed), and never change afterwards.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OperationRecord {
    kind: OpKind,
    key: Bytes,
    value: Option<Bytes>,
    key_len: usize,
    value_len: usize,
    namespace: Namespace,
}

impl OperationRecord {
    /// Classifies an operation and builds its record, or returns `None` if the
    /// key is [`Namespace::Unclassified`].
    ///
    /// Gets and puts are classified with their value; deletes (and range
    /// deletes, by their start key) on the key alone. For a
    /// [`OpKind::DeleteRange`], `value` is the exclusive end of the range.
    pub fn classified(kind: OpKind, key: &[u8], value: Option<&[u8]>) -> Option<Self> {
        let namespace = match kind {
            OpKind::Get | OpKind::Put => classify(key, value),
            OpKind::Delete | OpKind::DeleteRange => classify_key(key),
        };

        namespace.is_classified().then(|| {
            Self::new(
                kind,
                Bytes::copy_from_slice(key),
                value.map(Bytes::copy_from_slice),
                namespace,
            )
        })
    }

    /// Builds a record with sizes taken from the payloads.
    pub fn new(kind: OpKind, key: Bytes, value: Option<Bytes>, namespace: Namespace) -> Self {
        let key_len = key.len();
        let value_len = value.as_ref().map_or(0, Bytes::len);

        Self {
            kind,
            key,
            value,
            key_len,
            value_len,
            namespace,
        }
    }

    /// The operation kind.
    pub const fn kind(&self) -> OpKind {
        self.kind
    }

    /// The key (the range start for a [`OpKind::DeleteRange`]).
    pub const fn key(&self) -> &Bytes {
        &self.key
    }

    /// The value, absent for deletes (the range end for a
    /// [`OpKind::DeleteRange`]).
    pub const fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// The key size as recorded.
    pub const fn key_len(&self) -> usize {
        self.key_len
    }

    /// The value size as recorded.
    pub const fn value_len(&self) -> usize {
        self.value_len
    }

    /// The namespace the key was classified into.
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }
}

impl Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", LogRow::from(self))
    }
}

/// The raw text of one log row, before any hex or name is decoded.
///
/// Keeping decoding separate lets each consumer decide which malformed
/// columns it can live with.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogRow {
    /// `Operation` column.
    pub operation: String,
    /// `KeyHex` column.
    pub key_hex: String,
    /// `ValueHex` column.
    pub value_hex: String,
    /// `KeySize` column.
    pub key_size: String,
    /// `ValueSize` column.
    pub value_size: String,
    /// `Type` column.
    pub namespace: String,
}

impl LogRow {
    /// Splits a log line into its columns.
    ///
    /// Returns `None` for lines with fewer than six columns. Columns past the
    /// sixth are ignored.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line
            .trim_end_matches(['\r', '\n'])
            .split(',')
            .map(|field| field.trim().trim_matches('"').to_string());

        Some(Self {
            operation: fields.next()?,
            key_hex: fields.next()?,
            value_hex: fields.next()?,
            key_size: fields.next()?,
            value_size: fields.next()?,
            namespace: fields.next()?,
        })
    }

    /// The header row every log starts with.
    pub fn header() -> Self {
        let [operation, key_hex, value_hex, key_size, value_size, namespace] =
            LOG_COLUMNS.map(str::to_string);

        Self {
            operation,
            key_hex,
            value_hex,
            key_size,
            value_size,
            namespace,
        }
    }

    /// Whether this row is the column header.
    pub fn is_header(&self) -> bool {
        self.operation == LOG_COLUMNS[0] && self.key_hex == LOG_COLUMNS[1]
    }

    /// Decodes every column.
    pub fn decode(&self) -> Result<OperationRecord, RecordDecodeError> {
        let kind = self.operation.parse()?;
        let key = decode_hex(&self.key_hex).map_err(|source| RecordDecodeError::InvalidHex {
            column: LOG_COLUMNS[1],
            source,
        })?;
        let value = match self.value_hex.is_empty() {
            true => None,
            false => Some(decode_hex(&self.value_hex).map_err(|source| {
                RecordDecodeError::InvalidHex {
                    column: LOG_COLUMNS[2],
                    source,
                }
            })?),
        };

        Ok(OperationRecord {
            kind,
            key: key.into(),
            value: value.map(Bytes::from),
            key_len: parse_size(&self.key_size, LOG_COLUMNS[3])?,
            value_len: parse_size(&self.value_size, LOG_COLUMNS[4])?,
            namespace: self.namespace.parse()?,
        })
    }
}

fn parse_size(s: &str, column: &'static str) -> Result<usize, RecordDecodeError> {
    s.parse().map_err(|_| RecordDecodeError::InvalidSize {
        column,
        value: s.to_string(),
    })
}

impl From<&OperationRecord> for LogRow {
    fn from(r: &OperationRecord) -> Self {
        Self {
            operation: r.kind.to_string(),
            key_hex: hex::encode(&r.key),
            value_hex: r.value.as_ref().map(hex::encode).unwrap_or_default(),
            key_size: r.key_len.to_string(),
            value_size: r.value_len.to_string(),
            namespace: r.namespace.to_string(),
        }
    }
}

impl Display for LogRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.operation,
            self.key_hex,
            self.value_hex,
            self.key_size,
            self.value_size,
            self.namespace
        )
    }
}
