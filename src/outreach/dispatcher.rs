//! Dispatch orchestrator: "send the next eligible email, if any".
//!
//! One call to [`Dispatcher::dispatch_next`] walks the state machine
//! `Idle → QuotaChecked → CandidateSelected → ContentGenerated → Delivered → Recorded`
//! and stops at the first terminal outcome. Recipient-level failures come
//! back as [`DispatchOutcome`] values; only storage failures are errors.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::delivery::{Mailer, OutgoingEmail, SenderIdentity};
use crate::error::{Error, QueueError};
use crate::outreach::generator::ContentGenerator;
use crate::outreach::ledger::Ledger;
use crate::outreach::model::QueueEntry;
use crate::outreach::queue::RecipientQueue;
use crate::outreach::quota::QuotaTracker;
use crate::retry::{self, RetryPolicy};

/// How far a dispatch attempt got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Idle,
    QuotaChecked,
    CandidateSelected,
    ContentGenerated,
    Delivered,
    Recorded,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchStage::Idle => "idle",
            DispatchStage::QuotaChecked => "quota_checked",
            DispatchStage::CandidateSelected => "candidate_selected",
            DispatchStage::ContentGenerated => "content_generated",
            DispatchStage::Delivered => "delivered",
            DispatchStage::Recorded => "recorded",
        };
        write!(f, "{s}")
    }
}

/// Terminal state of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered and recorded.
    Sent { address: String, sent_today: usize },
    /// Daily limit reached; nothing was touched.
    QuotaExceeded { sent_today: usize, limit: u32 },
    /// No candidates left.
    QueueEmpty,
    /// Candidate was already in the ledger. It has been consumed from the queue.
    AlreadySent { address: String },
    /// Content could not be produced; no delivery was attempted.
    GenerationFailed { address: String, reason: String },
    /// The delivery service did not accept the message.
    DeliveryFailed { address: String, reason: String },
}

impl DispatchOutcome {
    /// Recipient-level failures, as opposed to the benign steady-state exits.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::GenerationFailed { .. } | DispatchOutcome::DeliveryFailed { .. }
        )
    }

    /// The candidate this outcome concerns, if one was selected.
    pub fn address(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Sent { address, .. }
            | DispatchOutcome::AlreadySent { address }
            | DispatchOutcome::GenerationFailed { address, .. }
            | DispatchOutcome::DeliveryFailed { address, .. } => Some(address),
            DispatchOutcome::QuotaExceeded { .. } | DispatchOutcome::QueueEmpty => None,
        }
    }

    /// Whether another attempt in the same run could make progress.
    fn ends_run(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::QuotaExceeded { .. } | DispatchOutcome::QueueEmpty
        )
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sent {
                address,
                sent_today,
            } => write!(f, "sent to {address} ({sent_today} today)"),
            DispatchOutcome::QuotaExceeded { sent_today, limit } => {
                write!(f, "daily quota reached ({sent_today}/{limit})")
            }
            DispatchOutcome::QueueEmpty => write!(f, "queue empty"),
            DispatchOutcome::AlreadySent { address } => write!(f, "{address} already sent"),
            DispatchOutcome::GenerationFailed { address, reason } => {
                write!(f, "generation failed for {address}: {reason}")
            }
            DispatchOutcome::DeliveryFailed { address, reason } => {
                write!(f, "delivery failed for {address}: {reason}")
            }
        }
    }
}

/// Behavior knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub sender: SenderIdentity,
    /// Put a candidate back on the queue when generation or delivery fails,
    /// once the run is over. Off by default: a consumed candidate stays
    /// consumed.
    pub requeue_on_failure: bool,
    pub delivery_retry: RetryPolicy,
}

impl DispatchSettings {
    pub fn new(sender: SenderIdentity) -> Self {
        Self {
            sender,
            requeue_on_failure: false,
            delivery_retry: RetryPolicy::default(),
        }
    }
}

/// Everything the dispatcher works on.
pub struct DispatchDeps {
    pub ledger: Ledger,
    pub queue: RecipientQueue,
    pub quota: QuotaTracker,
    pub generator: Arc<dyn ContentGenerator>,
    pub mailer: Arc<dyn Mailer>,
}

pub struct Dispatcher {
    settings: DispatchSettings,
    deps: DispatchDeps,
    rng: StdRng,
    /// Failed candidates waiting for [`Dispatcher::requeue_failed`].
    failed: Vec<QueueEntry>,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings, deps: DispatchDeps) -> Self {
        Self::with_rng(settings, deps, StdRng::from_entropy())
    }

    /// Use a specific random source for candidate selection.
    pub fn with_rng(settings: DispatchSettings, deps: DispatchDeps, rng: StdRng) -> Self {
        Self {
            settings,
            deps,
            rng,
            failed: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.deps.ledger
    }

    pub fn queue(&self) -> &RecipientQueue {
        &self.deps.queue
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.deps.quota
    }

    /// Entries set aside for requeueing after this run.
    pub fn pending_requeue(&self) -> &[QueueEntry] {
        &self.failed
    }

    /// Run one dispatch attempt.
    ///
    /// Returns `Err` only when a store fails; in that case the run must stop.
    /// A failed candidate is held back rather than requeued, so it cannot be
    /// picked again in the same run; call [`requeue_failed`](Self::requeue_failed)
    /// when done, or use [`run`](Self::run).
    pub async fn dispatch_next(&mut self) -> Result<DispatchOutcome, Error> {
        // Idle → QuotaChecked
        let quota = self.deps.quota.state(&self.deps.ledger);
        if !quota.under_limit() {
            info!(sent_today = quota.sent, limit = quota.limit, "Daily quota reached");
            return Ok(DispatchOutcome::QuotaExceeded {
                sent_today: quota.sent,
                limit: quota.limit,
            });
        }
        debug!(stage = %DispatchStage::QuotaChecked, remaining = quota.remaining(), "Quota checked");

        // QuotaChecked → CandidateSelected
        let entry = match self.deps.queue.take_next(&mut self.rng).await {
            Ok(entry) => entry,
            Err(QueueError::Empty) => {
                info!("Recipient queue is empty");
                return Ok(DispatchOutcome::QueueEmpty);
            }
            Err(QueueError::Storage(e)) => {
                error!(stage = %DispatchStage::QuotaChecked, error = %e, "Failed to take candidate");
                return Err(e.into());
            }
        };
        let recipient = entry.to_recipient();
        let address = recipient.address.clone();
        debug!(stage = %DispatchStage::CandidateSelected, address = %address, "Candidate selected");

        if self.deps.ledger.was_sent(&address) {
            info!(address = %address, "Candidate already sent, skipping");
            return Ok(DispatchOutcome::AlreadySent { address });
        }

        // CandidateSelected → ContentGenerated
        let generated = self.deps.generator.generate(&recipient).await;
        let message = match generated {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    stage = %DispatchStage::CandidateSelected,
                    address = %address,
                    generator = %self.deps.generator.name(),
                    error = %e,
                    "Content generation failed"
                );
                self.hold_for_requeue(entry);
                return Ok(DispatchOutcome::GenerationFailed {
                    address,
                    reason: e.to_string(),
                });
            }
        };
        debug!(stage = %DispatchStage::ContentGenerated, address = %address, subject = %message.subject, "Content generated");

        // ContentGenerated → Delivered
        let email = OutgoingEmail {
            to: address.clone(),
            from: self.settings.sender.clone(),
            subject: message.subject,
            html_body: message.html_body,
        };
        let mailer = &self.deps.mailer;
        let delivered = retry::with_policy(&self.settings.delivery_retry, "delivery", || {
            mailer.send(&email)
        })
        .await;
        if let Err(e) = delivered {
            warn!(
                stage = %DispatchStage::ContentGenerated,
                address = %address,
                transport = %self.deps.mailer.name(),
                error = %e,
                "Delivery failed"
            );
            // Requeuing a send that may have gone out could send twice.
            if e.may_have_delivered() {
                warn!(address = %address, "Delivery outcome unknown; candidate will not be requeued");
            } else {
                self.hold_for_requeue(entry);
            }
            return Ok(DispatchOutcome::DeliveryFailed {
                address,
                reason: e.to_string(),
            });
        }
        debug!(stage = %DispatchStage::Delivered, address = %address, "Delivered");

        // Delivered → Recorded
        let now = self.deps.quota.now();
        if let Err(source) = self.deps.ledger.record_sent(&address, now).await {
            error!(
                stage = %DispatchStage::Delivered,
                address = %address,
                error = %source,
                "Email was delivered but could not be recorded; add it to the ledger by hand"
            );
            return Err(Error::Unrecorded { address, source });
        }

        let sent_today = self.deps.quota.count_sent_today(&self.deps.ledger);
        info!(
            stage = %DispatchStage::Recorded,
            address = %address,
            sent_today = sent_today,
            limit = self.deps.quota.max_per_day(),
            "Outreach email sent"
        );
        Ok(DispatchOutcome::Sent {
            address,
            sent_today,
        })
    }

    /// Run up to `max_attempts` dispatches, stopping early once the quota is
    /// reached or the queue runs dry.
    /// reached or the queue runs dry. Failed candidates go back on the queue
    /// at the end, when requeueing is enabled.
    pub async fn run(&mut self, max_attempts: usize) -> Result<Vec<DispatchOutcome>, Error> {
        let mut outcomes = Vec::new();
        for _ in 0..max_attempts {
            let outcome = match self.dispatch_next().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if !self.failed.is_empty() {
                        warn!(pending = self.failed.len(), "Run aborted before failed candidates were requeued");
                    }
                    return Err(e);
                }
            };
            let done = outcome.ends_run();
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        self.requeue_failed().await?;
        Ok(outcomes)
    }

    /// Put held-back failed candidates back on the queue. Returns how many
    /// were added.
    pub async fn requeue_failed(&mut self) -> Result<usize, Error> {
        let mut added = 0;
        while let Some(entry) = self.failed.first().cloned() {
            if self.deps.queue.requeue(entry).await? {
                added += 1;
            }
            self.failed.remove(0);
        }
        Ok(added)
    }

    fn hold_for_requeue(&mut self, entry: QueueEntry) {
        if !self.settings.requeue_on_failure {
            warn!(address = %entry.address(), "Candidate consumed without a send; re-add it to the queue to retry");
            return;
        }
        self.failed.push(entry);
    }
}
