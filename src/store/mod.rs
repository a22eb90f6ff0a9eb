//! Persistence layer for ledger and queue stores, plus the run lock.

pub mod file;
pub mod lock;
pub mod memory;
pub mod traits;

pub use file::{JsonQueueStore, JsonlLedgerStore};
pub use lock::RunLock;
pub use memory::{MemoryLedgerStore, MemoryQueueStore};
pub use traits::{LedgerStore, QueueStore};
