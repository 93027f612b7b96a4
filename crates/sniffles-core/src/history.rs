//! Bounded call history
//!
//! A FIFO log of [`CallRecord`]s. Once full, each append evicts the oldest
//! entry. All operations take one short critical section on a single lock.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::config::defaults::DEFAULT_HISTORY_CAPACITY;
use crate::record::CallRecord;

#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<CallRecord>>,
}

impl HistoryLog {
    /// Create a log holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of records kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, returning the evicted oldest record if the log was full
    pub fn append(&self, record: CallRecord) -> Option<CallRecord> {
        self.append_with(record, |_| {})
    }

    /// Append a record and run `on_append` before releasing the lock.
    ///
    /// Callbacks run in the same order as the appends land in the log.
    pub fn append_with<F>(&self, record: CallRecord, on_append: F) -> Option<CallRecord>
    where
        F: FnOnce(&CallRecord),
    {
        let mut entries = self.entries.lock();
        on_append(&record);
        entries.push_back(record);
        if entries.len() > self.capacity {
            entries.pop_front()
        } else {
            None
        }
    }

    /// Independent copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Most recently appended record
    pub fn latest(&self) -> Option<CallRecord> {
        self.entries.lock().back().cloned()
    }

    /// Remove every record, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log holds no records
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
