//! Daily send quota, derived from ledger dates.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};

use super::ledger::Ledger;

/// Reference daily limit.
pub const DEFAULT_MAX_PER_DAY: u32 = 250;

/// Source of "now" in host local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Pinned clock for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Snapshot of today's quota usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub date: NaiveDate,
    pub sent: usize,
    pub limit: u32,
}

impl QuotaState {
    pub fn remaining(&self) -> usize {
        (self.limit as usize).saturating_sub(self.sent)
    }

    pub fn under_limit(&self) -> bool {
        self.sent < self.limit as usize
    }
}

/// Counts today's sends against a fixed daily limit. Nothing is stored;
/// every query recounts the ledger.
#[derive(Clone)]
pub struct QuotaTracker {
    max_per_day: u32,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(max_per_day: u32) -> Self {
        Self::with_clock(max_per_day, Arc::new(SystemClock))
    }

    pub fn with_clock(max_per_day: u32, clock: Arc<dyn Clock>) -> Self {
        Self { max_per_day, clock }
    }

    pub fn max_per_day(&self) -> u32 {
        self.max_per_day
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    pub fn count_sent_today(&self, ledger: &Ledger) -> usize {
        ledger.count_on(self.clock.today())
    }

    pub fn under_limit(&self, ledger: &Ledger) -> bool {
        self.state(ledger).under_limit()
    }

    pub fn state(&self, ledger: &Ledger) -> QuotaState {
        let date = self.clock.today();
        QuotaState {
            date,
            sent: ledger.count_on(date),
            limit: self.max_per_day,
        }
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_DAY)
    }
}
