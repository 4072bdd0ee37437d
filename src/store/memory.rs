//! Multi-indexed in-memory store with snapshot isolation
//!
//! Readers clone the current `Arc<Snapshot>` under a read lock that is held
//! only for the clone, then query without any lock. Writers are serialized
//! by a separate writer mutex, build a new snapshot, and swap it in under a
//! write lock held only for the swap.

use super::error::{SchemaError, StoreError};
use super::record::{KeyValue, Record};
use super::schema::TableSchema;
use super::snapshot::{ReadTxn, ResultSet, Snapshot};
use super::txn::WriteTxn;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Indexed record store
///
/// Share it between tasks behind an `Arc`. Every method takes `&self`.
pub struct IndexedStore<R: Record> {
    schema: Arc<TableSchema>,

    /// Currently published snapshot
    current: RwLock<Arc<Snapshot<R>>>,

    /// Serializes writers
    writer: Mutex<()>,
}

impl<R: Record> IndexedStore<R> {
    /// Create an empty store for a validated schema
    pub fn new(schema: TableSchema) -> Result<Self, SchemaError> {
        schema.validate()?;
        info!(
            table = %schema.name,
            indexes = schema.indexes.len(),
            "Initializing indexed store"
        );

        let schema = Arc::new(schema);
        let empty = Snapshot::empty(Arc::clone(&schema));

        Ok(IndexedStore {
            schema,
            current: RwLock::new(Arc::new(empty)),
            writer: Mutex::new(()),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Take a consistent read view of the current state
    pub fn snapshot(&self) -> ReadTxn<R> {
        // A poisoned lock still holds a complete snapshot: swaps are a single assignment.
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        ReadTxn::new(Arc::clone(&*current))
    }

    /// Start a write transaction, waiting for any other writer to finish
    pub fn txn(&self) -> WriteTxn<'_, R> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = {
            let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
            (**current).clone()
        };
        WriteTxn::new(self, guard, base)
    }

    /// Swap in a new snapshot (called by `WriteTxn::commit`)
    pub(crate) fn publish(&self, snapshot: Snapshot<R>) {
        let next = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = next;
    }

    /// Insert a record, or replace the one with the same primary key
    pub fn upsert(&self, record: R) -> Result<(), StoreError> {
        let mut txn = self.txn();
        txn.insert(record)?;
        txn.commit()
    }

    /// Delete the single row sharing `record`'s primary key
    pub fn delete(&self, record: &R) -> Result<bool, StoreError> {
        let mut txn = self.txn();
        let removed = txn.delete(record)?;
        txn.commit()?;
        Ok(removed)
    }

    /// Delete every row matching `args` on `index`
    pub fn delete_by_index(&self, index: &str, args: &[KeyValue]) -> Result<usize, StoreError> {
        let mut txn = self.txn();
        let removed = txn.delete_all(index, args)?;
        txn.commit()?;

        debug!(index, removed, "deleted rows by index");
        Ok(removed)
    }

    /// Query the current snapshot
    pub fn query(&self, index: &str, args: &[KeyValue]) -> Result<ResultSet<R>, StoreError> {
        self.snapshot().query(index, args)
    }

    /// Number of rows in the current snapshot
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the current snapshot (number of committed changes)
    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let snapshot = {
            let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(&*current)
        };

        let indexes = self
            .schema
            .indexes
            .iter()
            .enumerate()
            .map(|(pos, index)| IndexStats {
                name: index.name.clone(),
                unique: index.unique,
                distinct_keys: snapshot.distinct_keys(pos),
            })
            .collect();

        StoreStats {
            table: self.schema.name.clone(),
            rows: snapshot.len(),
            version: snapshot.version(),
            indexes,
        }
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub table: String,
    pub rows: usize,
    pub version: u64,
    pub indexes: Vec<IndexStats>,
}

/// Statistics for a single index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub unique: bool,
    pub distinct_keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::FieldValue;
    use crate::store::schema::{IndexSchema, Indexer, ID_INDEX};
    use std::collections::HashSet;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Grade {
        course: i64,
        pupil: String,
        mark: f64,
    }

    impl Record for Grade {
        fn field(&self, name: &str) -> Option<FieldValue<'_>> {
            match name {
                "course" => Some(FieldValue::Int(self.course)),
                "pupil" => Some(FieldValue::Str(&self.pupil)),
                _ => None,
            }
        }
    }

    fn grade(course: i64, pupil: &str, mark: f64) -> Grade {
        Grade {
            course,
            pupil: pupil.to_string(),
            mark,
        }
    }

    fn store() -> IndexedStore<Grade> {
        let schema = TableSchema::new(
            "grades",
            vec![
                IndexSchema::unique(
                    ID_INDEX,
                    Indexer::compound(vec![Indexer::int("course"), Indexer::string("pupil")], true),
                ),
                IndexSchema::non_unique("pupil", Indexer::string("pupil")),
                IndexSchema::unique("u_pupil", Indexer::string("pupil")),
                IndexSchema::non_unique("course", Indexer::int("course")),
                IndexSchema::unique("u_course", Indexer::int("course")),
            ],
        );
        IndexedStore::new(schema).unwrap()
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let schema = TableSchema::new("t", vec![IndexSchema::non_unique("x", Indexer::int("x"))]);
        assert_eq!(
            IndexedStore::<Grade>::new(schema).err(),
            Some(SchemaError::MissingIdIndex)
        );
    }

    #[test]
    fn test_upsert_replaces_in_every_index() {
        let store = store();
        store.upsert(grade(1, "amy", 0.5)).unwrap();
        store.upsert(grade(1, "amy", 0.9)).unwrap();

        assert_eq!(store.len(), 1);
        for index in [ID_INDEX, "pupil", "u_pupil", "course", "u_course"] {
            let rows = store.query(index, &[]).unwrap().to_vec();
            assert_eq!(rows, vec![grade(1, "amy", 0.9)], "index {}", index);
        }
    }

    #[test]
    fn test_unique_index_enumerates_distinct_values() {
        let store = store();
        for pupil in ["amy", "bob", "cat"] {
            store.upsert(grade(1, pupil, 0.5)).unwrap();
            store.upsert(grade(2, pupil, 0.5)).unwrap();
        }
        store.upsert(grade(3, "amy", 0.5)).unwrap();

        let courses: Vec<i64> = store.query("u_course", &[]).unwrap().iter().map(|g| g.course).collect();
        assert_eq!(courses, vec![1, 2, 3]);

        let pupils: Vec<String> = store.query("u_pupil", &[]).unwrap().iter().map(|g| g.pupil.clone()).collect();
        assert_eq!(pupils, vec!["amy", "bob", "cat"]);
    }

    #[test]
    fn test_unique_index_survives_partial_delete() {
        let store = store();
        store.upsert(grade(1, "amy", 0.5)).unwrap();
        store.upsert(grade(2, "amy", 0.7)).unwrap();

        assert_eq!(store.delete_by_index("course", &[1.into()]).unwrap(), 1);

        let pupils = store.query("u_pupil", &[]).unwrap().to_vec();
        assert_eq!(pupils, vec![grade(2, "amy", 0.7)]);
    }

    #[test]
    fn test_query_order_and_ties() {
        let store = store();
        store.upsert(grade(2, "bob", 0.1)).unwrap();
        store.upsert(grade(1, "cat", 0.2)).unwrap();
        store.upsert(grade(1, "amy", 0.3)).unwrap();
        store.upsert(grade(10, "amy", 0.4)).unwrap();

        let all: Vec<(i64, String)> = store
            .query(ID_INDEX, &[])
            .unwrap()
            .iter()
            .map(|g| (g.course, g.pupil.clone()))
            .collect();
        assert_eq!(
            all,
            vec![(1, "amy".into()), (1, "cat".into()), (2, "bob".into()), (10, "amy".into())]
        );

        // Equal pupil keys come out by primary key
        let amy: Vec<i64> = store.query("pupil", &["amy".into()]).unwrap().iter().map(|g| g.course).collect();
        assert_eq!(amy, vec![1, 10]);
    }

    #[test]
    fn test_prefix_query_on_compound_index() {
        let store = store();
        store.upsert(grade(1, "amy", 0.3)).unwrap();
        store.upsert(grade(1, "bob", 0.3)).unwrap();
        store.upsert(grade(2, "amy", 0.3)).unwrap();

        assert_eq!(store.query(ID_INDEX, &[1.into()]).unwrap().iter().count(), 2);
        assert_eq!(store.query(ID_INDEX, &[1.into(), "bob".into()]).unwrap().iter().count(), 1);
        assert!(store.query(ID_INDEX, &[3.into()]).unwrap().is_empty());
    }

    #[test]
    fn test_result_set_is_restartable_and_isolated() {
        let store = store();
        store.upsert(grade(1, "amy", 0.3)).unwrap();
        store.upsert(grade(1, "bob", 0.3)).unwrap();

        let result = store.query("course", &[1.into()]).unwrap();
        store.upsert(grade(1, "cat", 0.3)).unwrap();
        store.delete_by_index("course", &[1.into()]).unwrap();

        assert_eq!(result.iter().count(), 2);
        assert_eq!(result.iter().count(), 2);
        assert!(store.query("course", &[1.into()]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_by_index_counts() {
        let store = store();
        store.upsert(grade(7, "amy", 0.3)).unwrap();
        store.upsert(grade(7, "bob", 0.3)).unwrap();
        store.upsert(grade(8, "bob", 0.3)).unwrap();
        let before = store.version();

        assert_eq!(store.delete_by_index("course", &[7.into()]).unwrap(), 2);
        assert!(store.query("course", &[7.into()]).unwrap().is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.version(), before + 1);

        // Nothing matched: no new version
        assert_eq!(store.delete_by_index("course", &[7.into()]).unwrap(), 0);
        assert_eq!(store.version(), before + 1);
    }

    #[test]
    fn test_unknown_index_and_bad_keys() {
        let store = store();
        assert_eq!(
            store.query("nope", &[]).err(),
            Some(StoreError::UnknownIndex("nope".into()))
        );
        assert!(matches!(
            store.delete_by_index("nope", &[1.into()]),
            Err(StoreError::UnknownIndex(_))
        ));
        assert!(matches!(
            store.query("course", &["7".into()]),
            Err(StoreError::KeyType { .. })
        ));
    }

    #[test]
    fn test_single_delete() {
        let store = store();
        store.upsert(grade(1, "amy", 0.3)).unwrap();
        assert!(store.delete(&grade(1, "amy", 0.0)).unwrap());
        assert!(!store.delete(&grade(1, "amy", 0.0)).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        #[derive(Clone)]
        struct Partial(i64);
        impl Record for Partial {
            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                (name == "course").then_some(FieldValue::Int(self.0))
            }
        }

        let schema = TableSchema::new(
            "partial",
            vec![
                IndexSchema::unique(ID_INDEX, Indexer::int("course")),
                IndexSchema::non_unique("pupil", Indexer::string("pupil")),
            ],
        );
        let store = IndexedStore::new(schema).unwrap();

        let err = store.upsert(Partial(1)).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { .. }));
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_failed_operation_discards_whole_transaction() {
        #[derive(Clone)]
        struct Tagged(i64, Option<&'static str>);
        impl Record for Tagged {
            fn field(&self, name: &str) -> Option<FieldValue<'_>> {
                match name {
                    "course" => Some(FieldValue::Int(self.0)),
                    "tag" => self.1.map(FieldValue::Str),
                    _ => None,
                }
            }
        }

        let schema = TableSchema::new(
            "tagged",
            vec![
                IndexSchema::unique(ID_INDEX, Indexer::int("course")),
                IndexSchema::non_unique("tag", Indexer::string("tag")),
            ],
        );
        let store = IndexedStore::new(schema).unwrap();

        let mut txn = store.txn();
        assert_eq!(txn.insert(Tagged(1, Some("x"))), Ok(false));
        assert!(matches!(txn.insert(Tagged(2, None)), Err(StoreError::MissingField { .. })));
        assert!(txn.is_failed());
        assert_eq!(txn.insert(Tagged(3, Some("y"))), Err(StoreError::TxnFailed));
        assert_eq!(txn.commit(), Err(StoreError::TxnFailed));

        assert!(store.is_empty());
        assert_eq!(store.version(), 0);

        // The writer lock was released with the failed transaction
        store.upsert(Tagged(1, Some("x"))).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_aborted_transaction_is_invisible() {
        let store = store();
        let mut txn = store.txn();
        txn.insert(grade(1, "amy", 0.3)).unwrap();
        txn.insert(grade(2, "amy", 0.3)).unwrap();
        assert_eq!(txn.len(), 2);
        txn.abort();

        assert!(store.is_empty());

        let mut txn = store.txn();
        txn.insert(grade(1, "amy", 0.3)).unwrap();
        txn.insert(grade(2, "amy", 0.3)).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_concurrent_disjoint_upserts() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store.upsert(grade(t, &format!("pupil{}", i), 0.5)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 400);
        let courses: HashSet<i64> = store.query("u_course", &[]).unwrap().iter().map(|g| g.course).collect();
        assert_eq!(courses.len(), 8);
    }

    #[test]
    fn test_readers_never_see_mixed_indexes() {
        let store = Arc::new(store());
        store.upsert(grade(1, "amy", 0.0)).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 1..=500 {
                    store.upsert(grade(1, "amy", i as f64)).unwrap();
                }
            })
        };

        for _ in 0..500 {
            let view = store.snapshot();
            let marks: Vec<f64> = [ID_INDEX, "pupil", "u_pupil", "course", "u_course"]
                .iter()
                .map(|index| view.query(index, &[]).unwrap().iter().next().unwrap().mark)
                .collect();
            assert!(marks.windows(2).all(|w| w[0] == w[1]), "mixed view: {:?}", marks);
        }

        writer.join().unwrap();
        assert_eq!(store.query(ID_INDEX, &[]).unwrap().to_vec()[0].mark, 500.0);
    }

    #[test]
    fn test_stats() {
        let store = store();
        store.upsert(grade(1, "amy", 0.3)).unwrap();
        store.upsert(grade(2, "amy", 0.3)).unwrap();

        let stats = store.stats();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.version, 2);
        let u_pupil = stats.indexes.iter().find(|i| i.name == "u_pupil").unwrap();
        assert_eq!(u_pupil.distinct_keys, 1);
    }
}
