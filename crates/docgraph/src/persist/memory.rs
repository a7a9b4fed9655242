use super::{PersistError, Persister, Record};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
};

///
/// MemoryPersister
///
/// BTreeMap-backed reference backend. Tracks how often each fetch entry
/// point was hit, which is what the lazy-hydration and batching tests
/// assert against.
///

#[derive(Default)]
pub struct MemoryPersister {
    records: RefCell<BTreeMap<(String, String), Record>>,
    record_fetches: Cell<usize>,
    batch_fetches: Cell<usize>,
    last_batch_len: Cell<usize>,
}

impl MemoryPersister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one record, keyed under its concrete type.
    pub fn insert(&self, record: Record) {
        self.records.borrow_mut().insert(
            (record.type_key.clone(), record.identifier.clone()),
            record,
        );
    }

    #[must_use]
    pub fn record_fetches(&self) -> usize {
        self.record_fetches.get()
    }

    #[must_use]
    pub fn batch_fetches(&self) -> usize {
        self.batch_fetches.get()
    }

    /// Number of identifiers requested by the most recent batch fetch.
    #[must_use]
    pub fn last_batch_len(&self) -> usize {
        self.last_batch_len.get()
    }

    fn lookup(&self, type_key: &str, id: &str) -> Option<Record> {
        let records = self.records.borrow();
        if let Some(record) = records.get(&(type_key.to_string(), id.to_string())) {
            return Some(record.clone());
        }

        // Polymorphic stores answer base-type queries from subtype rows; a
        // flat map has no subtype index, so fall back to scanning by id.
        records
            .values()
            .find(|record| record.identifier == id)
            .cloned()
    }
}

impl Persister for MemoryPersister {
    fn retrieve_record(&self, type_key: &str, id: &str) -> Result<Record, PersistError> {
        self.record_fetches.set(self.record_fetches.get() + 1);

        self.lookup(type_key, id)
            .ok_or_else(|| PersistError::not_found(type_key, id))
    }

    fn retrieve_records(
        &self,
        type_key: &str,
        ids: &[String],
    ) -> Result<Vec<Record>, PersistError> {
        self.batch_fetches.set(self.batch_fetches.get() + 1);
        self.last_batch_len.set(ids.len());

        Ok(ids
            .iter()
            .filter_map(|id| self.lookup(type_key, id))
            .collect())
    }
}
