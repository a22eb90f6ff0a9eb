//! In-memory stores for tests and dry wiring.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::traits::{LedgerStore, QueueStore};
use crate::error::StorageError;
use crate::outreach::model::{QueueEntry, SendRecord};

fn write_failure(what: &str) -> StorageError {
    StorageError::Write {
        path: format!("memory:{what}").into(),
        source: std::io::Error::other("injected write failure"),
    }
}

/// In-memory ledger. `fail_writes` makes every append fail.
#[derive(Default)]
pub struct MemoryLedgerStore {
    records: Mutex<Vec<SendRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SendRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of what has been persisted.
    pub fn records(&self) -> Vec<SendRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<Vec<SendRecord>, StorageError> {
        Ok(self.records())
    }

    async fn append(&self, record: &SendRecord) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure("ledger"));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// In-memory queue. `fail_writes` makes every save fail.
#[derive(Default)]
pub struct MemoryQueueStore {
    entries: Mutex<Vec<QueueEntry>>,
    fail_writes: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new(entries: Vec<QueueEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Queue of bare addresses.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            addresses
                .into_iter()
                .map(|a| QueueEntry::Address(a.into()))
                .collect(),
        )
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
        Ok(self.entries())
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(write_failure("queue"));
        }
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = entries.to_vec();
        Ok(())
    }
}
