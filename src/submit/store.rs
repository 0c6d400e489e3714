use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::error::{Result, SubmitError};
use crate::core::{RecordId, SubmissionRecord};

/// Persistence for submission records, keyed by an opaque id.
///
/// Implementations must apply [`update`](Self::update) atomically so that
/// status and error report are never observed out of step.
pub trait SubmissionStore: Send + Sync {
    /// Persist a new record. The store assigns the id; whatever `record.id`
    /// holds is replaced.
    fn create(&self, record: SubmissionRecord) -> Result<SubmissionRecord>;

    fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>>;

    /// Replace a stored record as a whole. Fails with
    /// [`SubmitError::NotFound`] when the id is unknown.
    fn update(&self, record: &SubmissionRecord) -> Result<()>;

    /// Remove a record; `false` when it did not exist.
    fn delete(&self, id: RecordId) -> Result<bool>;

    /// Records submitted for an invoice xid (see
    /// [`SubmissionRecord::matches_invoice_xid`]).
    fn find_by_invoice_xid(&self, xid: &str) -> Result<Vec<SubmissionRecord>>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<SubmissionRecord>>;
}

/// Process-local [`SubmissionStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    records: Mutex<BTreeMap<RecordId, SubmissionRecord>>,
    next_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<RecordId, SubmissionRecord>>> {
        self.records
            .lock()
            .map_err(|_| SubmitError::Store("record store lock poisoned".into()))
    }
}

impl SubmissionStore for InMemoryStore {
    fn create(&self, mut record: SubmissionRecord) -> Result<SubmissionRecord> {
        record.id = RecordId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()?.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    fn update(&self, record: &SubmissionRecord) -> Result<()> {
        match self.lock()?.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(SubmitError::NotFound(record.id)),
        }
    }

    fn delete(&self, id: RecordId) -> Result<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    fn find_by_invoice_xid(&self, xid: &str) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .lock()?
            .values()
            .filter(|r| r.matches_invoice_xid(xid))
            .cloned()
            .collect())
    }

    fn list(&self) -> Result<Vec<SubmissionRecord>> {
        let mut records: Vec<SubmissionRecord> = self.lock()?.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}
