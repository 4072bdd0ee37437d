//! In-memory indexed storage module
//!
//! Provides a single-table record store with declarative indexes,
//! all-or-nothing write transactions and snapshot-isolated reads.
//! This module knows nothing about exams or scores (loose coupling).

mod error;
mod memory;
mod record;
mod schema;
mod snapshot;
mod txn;

pub use error::{SchemaError, StoreError};
pub use memory::{IndexStats, IndexedStore, StoreStats};
pub use record::{FieldValue, IndexKey, KeyKind, KeyValue, Record};
pub use schema::{IndexSchema, Indexer, TableSchema, ID_INDEX};
pub use snapshot::{ReadTxn, ResultIter, ResultSet, Snapshot};
pub use txn::WriteTxn;
