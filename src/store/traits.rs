//! Store traits for the ledger and the queue.
//!
//! Both are read in full at invocation start. The ledger only ever grows by
//! appending; the queue is rewritten whole after every mutation.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::outreach::model::{QueueEntry, SendRecord};

/// Append-only persistence for send records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load every record ever written.
    async fn load(&self) -> Result<Vec<SendRecord>, StorageError>;

    /// Durably append one record.
    async fn append(&self, record: &SendRecord) -> Result<(), StorageError>;
}

/// Whole-list persistence for the recipient queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the current queue contents in stored order.
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError>;

    /// Replace the stored queue with `entries`.
    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError>;
}
