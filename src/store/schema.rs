//! Declarative table schema
//!
//! A table is described by a name and a list of indexes. Every table must
//! declare a unique `id` index; its key is the row's primary key.

use super::error::{SchemaError, StoreError};
use super::record::{FieldValue, IndexKey, KeyKind, KeyValue, Record};
use std::collections::HashSet;

/// Name of the mandatory primary index
pub const ID_INDEX: &str = "id";

/// How an index derives its key from a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indexer {
    /// Integer field
    Int(String),

    /// String field
    Str(String),

    /// Concatenation of several single-field indexers
    ///
    /// With `allow_missing`, a record missing a trailing part is indexed
    /// under the truncated key instead of being rejected. The first part
    /// is always required.
    Compound {
        parts: Vec<Indexer>,
        allow_missing: bool,
    },
}

impl Indexer {
    pub fn int(field: impl Into<String>) -> Self {
        Indexer::Int(field.into())
    }

    pub fn string(field: impl Into<String>) -> Self {
        Indexer::Str(field.into())
    }

    pub fn compound(parts: Vec<Indexer>, allow_missing: bool) -> Self {
        Indexer::Compound {
            parts,
            allow_missing,
        }
    }

    /// Kinds of the key components, in order
    pub fn kinds(&self) -> Vec<KeyKind> {
        match self {
            Indexer::Int(_) => vec![KeyKind::Int],
            Indexer::Str(_) => vec![KeyKind::Str],
            Indexer::Compound { parts, .. } => parts.iter().flat_map(|p| p.kinds()).collect(),
        }
    }

    /// Compute the key this indexer assigns to `record`
    pub(crate) fn key_for<R: Record>(&self, index: &str, record: &R) -> Result<IndexKey, StoreError> {
        match self {
            Indexer::Int(field) => Ok(vec![read_field(index, field, KeyKind::Int, record)?]),
            Indexer::Str(field) => Ok(vec![read_field(index, field, KeyKind::Str, record)?]),
            Indexer::Compound {
                parts,
                allow_missing,
            } => {
                let mut key = Vec::with_capacity(parts.len());
                for (i, part) in parts.iter().enumerate() {
                    match part.key_for(index, record) {
                        Ok(mut k) => key.append(&mut k),
                        Err(StoreError::MissingField { .. }) if *allow_missing && i > 0 => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(key)
            }
        }
    }

    fn validate(&self, index: &str, nested: bool) -> Result<(), SchemaError> {
        match self {
            Indexer::Int(field) | Indexer::Str(field) => {
                if field.is_empty() {
                    return Err(SchemaError::EmptyField(index.to_string()));
                }
                Ok(())
            }
            Indexer::Compound { parts, .. } => {
                if nested {
                    return Err(SchemaError::NestedCompound(index.to_string()));
                }
                if parts.is_empty() {
                    return Err(SchemaError::EmptyCompound(index.to_string()));
                }
                parts.iter().try_for_each(|p| p.validate(index, true))
            }
        }
    }
}

fn read_field<R: Record>(
    index: &str,
    field: &str,
    expected: KeyKind,
    record: &R,
) -> Result<KeyValue, StoreError> {
    let value: FieldValue<'_> = record.field(field).ok_or_else(|| StoreError::MissingField {
        index: index.to_string(),
        field: field.to_string(),
    })?;

    if value.kind() != expected {
        return Err(StoreError::FieldType {
            index: index.to_string(),
            field: field.to_string(),
            expected,
        });
    }

    Ok(value.to_key())
}

/// One index over a table
///
/// A unique secondary index is an enumeration index: it keeps every row
/// carrying a key, but queries through it yield one row per distinct key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub unique: bool,
    pub indexer: Indexer,
}

impl IndexSchema {
    pub fn unique(name: impl Into<String>, indexer: Indexer) -> Self {
        IndexSchema {
            name: name.into(),
            unique: true,
            indexer,
        }
    }

    pub fn non_unique(name: impl Into<String>, indexer: Indexer) -> Self {
        IndexSchema {
            name: name.into(),
            unique: false,
            indexer,
        }
    }
}

/// Schema of a single table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, indexes: Vec<IndexSchema>) -> Self {
        TableSchema {
            name: name.into(),
            indexes,
        }
    }

    /// Check the schema can back a store
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if self.indexes.is_empty() {
            return Err(SchemaError::NoIndexes);
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.name.is_empty() {
                return Err(SchemaError::EmptyIndexName);
            }
            if !seen.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateIndex(index.name.clone()));
            }
            index.indexer.validate(&index.name, false)?;
        }

        match self.index(ID_INDEX) {
            None => Err(SchemaError::MissingIdIndex),
            Some((_, id)) if !id.unique => Err(SchemaError::IdIndexNotUnique),
            Some(_) => Ok(()),
        }
    }

    /// Look up an index by name, returning its position
    pub fn index(&self, name: &str) -> Option<(usize, &IndexSchema)> {
        self.indexes
            .iter()
            .enumerate()
            .find(|(_, index)| index.name == name)
    }

    /// Position of the `id` index (only meaningful on a validated schema)
    pub(crate) fn id_position(&self) -> usize {
        self.index(ID_INDEX).map(|(pos, _)| pos).unwrap_or(0)
    }

    /// Resolve an index and type-check query arguments against it
    pub(crate) fn resolve(&self, name: &str, args: &[KeyValue]) -> Result<usize, StoreError> {
        let (pos, index) = self
            .index(name)
            .ok_or_else(|| StoreError::UnknownIndex(name.to_string()))?;

        let kinds = index.indexer.kinds();
        if args.len() > kinds.len() {
            return Err(StoreError::KeyArity {
                index: name.to_string(),
                expected: kinds.len(),
                got: args.len(),
            });
        }

        for (position, (arg, expected)) in args.iter().zip(kinds).enumerate() {
            if arg.kind() != expected {
                return Err(StoreError::KeyType {
                    index: name.to_string(),
                    position,
                    expected,
                });
            }
        }

        Ok(pos)
    }
}
