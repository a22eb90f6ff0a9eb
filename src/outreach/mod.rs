//! Outreach core: ledger, quota, queue, content generation and dispatch.

pub mod dispatcher;
pub mod generator;
pub mod ledger;
pub mod model;
pub mod queue;
pub mod quota;

pub use dispatcher::{DispatchDeps, DispatchOutcome, DispatchSettings, DispatchStage, Dispatcher};
pub use generator::{AiGenerator, AiSettings, ContentGenerator, TemplateGenerator};
pub use ledger::Ledger;
pub use model::{Message, QueueEntry, Recipient, SendRecord};
pub use queue::RecipientQueue;
pub use quota::{Clock, FixedClock, QuotaState, QuotaTracker, SystemClock};
