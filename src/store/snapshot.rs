//! Immutable point-in-time state of a table and all of its indexes
//!
//! A published `Snapshot` is never mutated. Writers clone the current one,
//! apply their changes to the clone and publish it as a whole, so a reader
//! holding an `Arc<Snapshot>` always sees every index at the same version.

use super::error::StoreError;
use super::record::{IndexKey, KeyValue, Record};
use super::schema::TableSchema;
use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

/// Index key -> primary keys of the rows carrying it
type IndexTree = BTreeMap<IndexKey, BTreeSet<IndexKey>>;

/// All rows of a table plus one tree per declared index
pub struct Snapshot<R> {
    schema: Arc<TableSchema>,
    version: u64,
    rows: BTreeMap<IndexKey, Arc<R>>,
    /// Aligned with `schema.indexes`
    trees: Vec<IndexTree>,
}

// Manual impl: rows are shared `Arc`s, so `R: Clone` is not needed here.
impl<R> Clone for Snapshot<R> {
    fn clone(&self) -> Self {
        Snapshot {
            schema: Arc::clone(&self.schema),
            version: self.version,
            rows: self.rows.clone(),
            trees: self.trees.clone(),
        }
    }
}

impl<R: Record> Snapshot<R> {
    /// Empty snapshot at version 0
    pub(crate) fn empty(schema: Arc<TableSchema>) -> Self {
        let trees = vec![IndexTree::new(); schema.indexes.len()];
        Snapshot {
            schema,
            version: 0,
            rows: BTreeMap::new(),
            trees,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of distinct keys held by the index at `pos`
    pub(crate) fn distinct_keys(&self, pos: usize) -> usize {
        self.trees[pos].len()
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Compute the key of `record` for every index, in schema order
    ///
    /// Runs before any tree is touched so a structural error leaves the
    /// snapshot unchanged.
    fn keys_for(&self, record: &R) -> Result<Vec<IndexKey>, StoreError> {
        self.schema
            .indexes
            .iter()
            .map(|index| index.indexer.key_for(&index.name, record))
            .collect()
    }

    /// Insert `record`, replacing any row with the same primary key
    ///
    /// Returns true if a previous row was replaced.
    pub(crate) fn insert(&mut self, record: R) -> Result<bool, StoreError> {
        let keys = self.keys_for(&record)?;
        let pk = keys[self.schema.id_position()].clone();

        let replaced = self.remove(&pk)?;

        for (tree, key) in self.trees.iter_mut().zip(keys) {
            tree.entry(key).or_default().insert(pk.clone());
        }
        self.rows.insert(pk, Arc::new(record));

        Ok(replaced)
    }

    /// Remove the row with primary key `pk` from the table and every index
    pub(crate) fn remove(&mut self, pk: &IndexKey) -> Result<bool, StoreError> {
        let old = match self.rows.get(pk) {
            Some(row) => Arc::clone(row),
            None => return Ok(false),
        };
        let keys = self.keys_for(&old)?;

        for (tree, key) in self.trees.iter_mut().zip(keys) {
            if let btree_map::Entry::Occupied(mut entry) = tree.entry(key) {
                entry.get_mut().remove(pk);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
        self.rows.remove(pk);

        Ok(true)
    }

    /// Primary key of `record` as the `id` index would compute it
    pub(crate) fn primary_key(&self, record: &R) -> Result<IndexKey, StoreError> {
        let index = &self.schema.indexes[self.schema.id_position()];
        index.indexer.key_for(&index.name, record)
    }

    /// Primary keys of every row whose key at `pos` starts with `prefix`
    ///
    /// Unlike a query, this does not collapse unique indexes to one row.
    pub(crate) fn matching(&self, pos: usize, prefix: &[KeyValue]) -> Vec<IndexKey> {
        self.trees[pos]
            .range::<[KeyValue], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(_, pks)| pks.iter().cloned())
            .collect()
    }
}

/// A consistent read-only view of the store
///
/// Every query made through the same `ReadTxn` sees the same version,
/// regardless of writes committed in the meantime.
pub struct ReadTxn<R> {
    snapshot: Arc<Snapshot<R>>,
}

impl<R> Clone for ReadTxn<R> {
    fn clone(&self) -> Self {
        ReadTxn {
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl<R: Record> ReadTxn<R> {
    pub(crate) fn new(snapshot: Arc<Snapshot<R>>) -> Self {
        ReadTxn { snapshot }
    }

    /// Query an index by full key, key prefix, or (no arguments) full scan
    pub fn query(&self, index: &str, args: &[KeyValue]) -> Result<ResultSet<R>, StoreError> {
        let pos = self.snapshot.schema().resolve(index, args)?;
        Ok(ResultSet {
            snapshot: Arc::clone(&self.snapshot),
            pos,
            prefix: args.to_vec(),
        })
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

/// The rows matched by a query
///
/// Holds the snapshot it was taken from, so iterating is lazy and can be
/// restarted any number of times with identical results. Rows come out in
/// index key order, ties broken by primary key.
pub struct ResultSet<R> {
    snapshot: Arc<Snapshot<R>>,
    pos: usize,
    prefix: IndexKey,
}

impl<R: Record> ResultSet<R> {
    pub fn iter(&self) -> ResultIter<'_, R> {
        let tree = &self.snapshot.trees[self.pos];
        ResultIter {
            rows: &self.snapshot.rows,
            keys: tree.range::<[KeyValue], _>((Bound::Included(self.prefix.as_slice()), Bound::Unbounded)),
            prefix: &self.prefix,
            unique: self.snapshot.schema.indexes[self.pos].unique,
            current: None,
            done: false,
        }
    }

    /// Snapshot version the result was read from
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Clone every matched row into a vector
    pub fn to_vec(&self) -> Vec<R> {
        self.iter().cloned().collect()
    }
}

impl<'a, R: Record> IntoIterator for &'a ResultSet<R> {
    type Item = &'a R;
    type IntoIter = ResultIter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a `ResultSet`
pub struct ResultIter<'a, R> {
    rows: &'a BTreeMap<IndexKey, Arc<R>>,
    keys: btree_map::Range<'a, IndexKey, BTreeSet<IndexKey>>,
    prefix: &'a [KeyValue],
    unique: bool,
    current: Option<btree_set::Iter<'a, IndexKey>>,
    done: bool,
}

impl<'a, R> Iterator for ResultIter<'a, R> {
    type Item = &'a R;

    fn next(&mut self) -> Option<&'a R> {
        loop {
            if let Some(pks) = self.current.as_mut() {
                match pks.next() {
                    Some(pk) => match self.rows.get(pk) {
                        Some(row) => return Some(&**row),
                        None => continue,
                    },
                    None => self.current = None,
                }
            }

            if self.done {
                return None;
            }

            match self.keys.next() {
                Some((key, pks)) if key.starts_with(self.prefix) => {
                    if self.unique {
                        // One row per distinct key: the lowest primary key
                        if let Some(row) = pks.iter().next().and_then(|pk| self.rows.get(pk)) {
                            return Some(&**row);
                        }
                    } else {
                        self.current = Some(pks.iter());
                    }
                }
                _ => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
