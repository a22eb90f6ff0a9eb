//! Recipient ledger. Tracks who has already been sent to.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{info, warn};

use crate::error::StorageError;
use crate::outreach::model::SendRecord;
use crate::store::LedgerStore;

/// Append-only record of sends, loaded in full at startup.
///
/// Address matching is exact and case-sensitive: `A@x.com` and `a@x.com`
/// are different recipients.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    records: Vec<SendRecord>,
    sent: HashSet<String>,
}

impl Ledger {
    /// Load every record from `store`.
    pub async fn load(store: Arc<dyn LedgerStore>) -> Result<Self, StorageError> {
        let records = store.load().await?;
        let mut sent = HashSet::with_capacity(records.len());
        for record in &records {
            if !sent.insert(record.address.clone()) {
                warn!(address = %record.address, "Ledger holds more than one record for address");
            }
        }
        Ok(Self {
            store,
            records,
            sent,
        })
    }

    pub fn was_sent(&self, address: &str) -> bool {
        self.sent.contains(address)
    }

    /// Durably record a confirmed send.
    ///
    /// Nothing is written if the address is already recorded, and the
    /// in-memory view only changes after the store accepted the record.
    pub async fn record_sent(
        &mut self,
        address: &str,
        when: DateTime<Local>,
    ) -> Result<&SendRecord, StorageError> {
        if self.was_sent(address) {
            return Err(StorageError::DuplicateRecord {
                address: address.to_string(),
            });
        }

        let record = SendRecord::new(address, when);
        self.store.append(&record).await?;

        info!(address = %address, date = %record.date, "Recorded send");
        self.sent.insert(record.address.clone());
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Number of records dated `date`.
    pub fn count_on(&self, date: NaiveDate) -> usize {
        self.records.iter().filter(|r| r.date == date).count()
    }

    pub fn records(&self) -> &[SendRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use chrono::Duration;

    #[tokio::test]
    async fn record_then_query() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut ledger = Ledger::load(store.clone()).await.unwrap();
        assert!(!ledger.was_sent("a@x.com"));

        ledger.record_sent("a@x.com", Local::now()).await.unwrap();
        assert!(ledger.was_sent("a@x.com"));
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn matching_is_case_sensitive() {
        let store = Arc::new(MemoryLedgerStore::with_records(vec![SendRecord::new(
            "A@x.com",
            Local::now(),
        )]));
        let ledger = Ledger::load(store).await.unwrap();
        assert!(ledger.was_sent("A@x.com"));
        assert!(!ledger.was_sent("a@x.com"));
    }

    #[tokio::test]
    async fn duplicate_record_is_rejected_without_writing() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut ledger = Ledger::load(store.clone()).await.unwrap();
        ledger.record_sent("a@x.com", Local::now()).await.unwrap();

        let err = ledger.record_sent("a@x.com", Local::now()).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateRecord { .. }));
        assert_eq!(store.records().len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_ledger_unchanged() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.set_fail_writes(true);
        let mut ledger = Ledger::load(store).await.unwrap();

        assert!(ledger.record_sent("a@x.com", Local::now()).await.is_err());
        assert!(!ledger.was_sent("a@x.com"));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn survives_reload() {
        let store = Arc::new(MemoryLedgerStore::new());
        {
            let mut ledger = Ledger::load(store.clone()).await.unwrap();
            ledger.record_sent("a@x.com", Local::now()).await.unwrap();
        }
        let ledger = Ledger::load(store).await.unwrap();
        assert!(ledger.was_sent("a@x.com"));
    }

    #[tokio::test]
    async fn counts_by_date() {
        let now = Local::now();
        let yesterday = now - Duration::days(1);
        let store = Arc::new(MemoryLedgerStore::with_records(vec![
            SendRecord::new("a@x.com", yesterday),
            SendRecord::new("b@x.com", now),
            SendRecord::new("c@x.com", now),
        ]));
        let ledger = Ledger::load(store).await.unwrap();
        assert_eq!(ledger.count_on(now.date_naive()), 2);
        assert_eq!(ledger.count_on(yesterday.date_naive()), 1);
    }
}
