//! Write transactions
//!
//! A `WriteTxn` holds the store's writer lock and a private copy of the
//! current snapshot. Nothing it does is visible until `commit`, which
//! publishes the copy in one pointer swap. Dropping it without committing
//! discards every change, and so does any failed operation: after one, the
//! transaction refuses further work and `commit` publishes nothing.

use super::error::StoreError;
use super::memory::IndexedStore;
use super::record::{KeyValue, Record};
use super::snapshot::Snapshot;
use std::sync::MutexGuard;
use tracing::{debug, warn};

pub struct WriteTxn<'a, R: Record> {
    store: &'a IndexedStore<R>,
    _writer: MutexGuard<'a, ()>,
    working: Snapshot<R>,
    changed: bool,
    // Set by the first failed operation; the transaction can then only be dropped
    failed: bool,
}

impl<'a, R: Record> WriteTxn<'a, R> {
    pub(crate) fn new(store: &'a IndexedStore<R>, writer: MutexGuard<'a, ()>, base: Snapshot<R>) -> Self {
        WriteTxn {
            store,
            _writer: writer,
            working: base,
            changed: false,
            failed: false,
        }
    }

    /// Insert or replace a row
    ///
    /// Returns true if a row with the same primary key was replaced.
    pub fn insert(&mut self, record: R) -> Result<bool, StoreError> {
        self.ensure_usable()?;
        let replaced = self.track(|working| working.insert(record))?;
        self.changed = true;
        Ok(replaced)
    }

    /// Remove the row with the same primary key as `record`
    pub fn delete(&mut self, record: &R) -> Result<bool, StoreError> {
        self.ensure_usable()?;
        let removed = self.track(|working| {
            let pk = working.primary_key(record)?;
            working.remove(&pk)
        })?;
        self.changed |= removed;
        Ok(removed)
    }

    /// Remove every row matching `args` on `index`, returning the count
    pub fn delete_all(&mut self, index: &str, args: &[KeyValue]) -> Result<usize, StoreError> {
        self.ensure_usable()?;
        let removed = self.track(|working| {
            let pos = working.schema().resolve(index, args)?;
            let mut removed = 0;
            for pk in working.matching(pos, args) {
                if working.remove(&pk)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })?;

        self.changed |= removed > 0;
        Ok(removed)
    }

    /// True once an operation in this transaction has failed
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.failed {
            return Err(StoreError::TxnFailed);
        }
        Ok(())
    }

    fn track<T>(
        &mut self,
        op: impl FnOnce(&mut Snapshot<R>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = op(&mut self.working);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// Rows visible to this transaction, including its own writes
    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Publish every change made by this transaction
    ///
    /// A transaction in which any operation failed publishes nothing and
    /// returns `StoreError::TxnFailed`.
    pub fn commit(mut self) -> Result<(), StoreError> {
        if self.failed {
            warn!(table = %self.working.schema().name, "discarding failed write transaction");
            return Err(StoreError::TxnFailed);
        }
        if !self.changed {
            return Ok(());
        }
        self.working.bump_version();
        debug!(
            table = %self.working.schema().name,
            version = self.working.version(),
            rows = self.working.len(),
            "committing write transaction"
        );
        self.store.publish(self.working);
        Ok(())
    }

    /// Discard every change made by this transaction
    pub fn abort(self) {}
}
