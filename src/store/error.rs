//! Store and schema errors

use super::record::KeyKind;
use std::fmt;

/// Recoverable errors returned by store reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Index name not declared in the schema
    UnknownIndex(String),

    /// The record does not expose a field an index needs
    MissingField { index: String, field: String },

    /// The record exposes the field with the wrong kind
    FieldType {
        index: String,
        field: String,
        expected: KeyKind,
    },

    /// More key arguments than the index has components
    KeyArity {
        index: String,
        expected: usize,
        got: usize,
    },

    /// A key argument has the wrong kind for its position
    KeyType {
        index: String,
        position: usize,
        expected: KeyKind,
    },

    /// Commit of a write transaction in which an operation had failed
    TxnFailed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownIndex(name) => write!(f, "unknown index '{}'", name),
            StoreError::MissingField { index, field } => {
                write!(f, "index '{}': record has no field '{}'", index, field)
            }
            StoreError::FieldType { index, field, expected } => write!(
                f,
                "index '{}': field '{}' is not of type {}",
                index, field, expected
            ),
            StoreError::KeyArity { index, expected, got } => write!(
                f,
                "index '{}' takes at most {} key values, got {}",
                index, expected, got
            ),
            StoreError::KeyType { index, position, expected } => write!(
                f,
                "index '{}': key value {} must be of type {}",
                index, position, expected
            ),
            StoreError::TxnFailed => {
                write!(f, "write transaction discarded after a failed operation")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// A table schema that cannot back a store
///
/// These are startup errors: the process must not continue without a
/// store, so callers treat them as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    EmptyTableName,
    NoIndexes,
    EmptyIndexName,
    DuplicateIndex(String),
    MissingIdIndex,
    IdIndexNotUnique,
    EmptyField(String),
    EmptyCompound(String),
    NestedCompound(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::EmptyTableName => write!(f, "table name is empty"),
            SchemaError::NoIndexes => write!(f, "table declares no indexes"),
            SchemaError::EmptyIndexName => write!(f, "index name is empty"),
            SchemaError::DuplicateIndex(name) => write!(f, "duplicate index '{}'", name),
            SchemaError::MissingIdIndex => write!(f, "table has no 'id' index"),
            SchemaError::IdIndexNotUnique => write!(f, "'id' index must be unique"),
            SchemaError::EmptyField(index) => {
                write!(f, "index '{}' references an empty field name", index)
            }
            SchemaError::EmptyCompound(index) => {
                write!(f, "compound index '{}' has no parts", index)
            }
            SchemaError::NestedCompound(index) => {
                write!(f, "compound index '{}' nests another compound indexer", index)
            }
        }
    }
}

impl std::error::Error for SchemaError {}
