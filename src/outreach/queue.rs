//! Recipient queue with random pick; entries leave the store before use.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::error::{QueueError, StorageError};
use crate::outreach::model::QueueEntry;
use crate::store::QueueStore;

/// Candidate list backed by a [`QueueStore`].
///
/// A taken entry is gone from the store before the caller sees it, so a crash
/// later in the dispatch skips the candidate rather than retrying it.
pub struct RecipientQueue {
    store: Arc<dyn QueueStore>,
    entries: Vec<QueueEntry>,
}

impl RecipientQueue {
    pub async fn load(store: Arc<dyn QueueStore>) -> Result<Self, StorageError> {
        let entries = store.load().await?;
        debug!(entries = entries.len(), "Loaded recipient queue");
        Ok(Self { store, entries })
    }

    pub fn has_next(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.iter().any(|e| e.address() == address)
    }

    /// Pick a uniformly random entry, persist its removal, and return it
    /// as stored, so a later [`requeue`](Self::requeue) puts back the same
    /// entry.
    ///
    /// If the store rejects the shortened list the entry is put back in
    /// memory and the storage error is returned.
    pub async fn take_next<R: Rng>(&mut self, rng: &mut R) -> Result<QueueEntry, QueueError> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }

        let idx = rng.gen_range(0..self.entries.len());
        let entry = self.entries.remove(idx);

        if let Err(e) = self.store.save(&self.entries).await {
            self.entries.insert(idx, entry);
            return Err(e.into());
        }

        debug!(address = %entry.address(), remaining = self.entries.len(), "Took candidate");
        Ok(entry)
    }

    /// Append `entry` unless its address is already queued. Returns whether
    /// the queue changed.
    pub async fn requeue(&mut self, entry: QueueEntry) -> Result<bool, StorageError> {
        if self.contains(entry.address()) {
            debug!(address = %entry.address(), "Already queued, not requeuing");
            return Ok(false);
        }

        let address = entry.address().to_string();
        self.entries.push(entry);
        if let Err(e) = self.store.save(&self.entries).await {
            self.entries.pop();
            return Err(e);
        }

        info!(address = %address, "Requeued recipient");
        Ok(true)
    }
}
