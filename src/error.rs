//! Error types for outreach dispatch.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type. Everything that reaches this type is fatal for the
/// current invocation; recipient-level failures are reported as
/// [`DispatchOutcome`](crate::outreach::DispatchOutcome) variants instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Delivered to {address} but the send could not be recorded: {source}")]
    Unrecorded {
        address: String,
        #[source]
        source: StorageError,
    },

    #[error("Delivery setup error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("LLM setup error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable store errors (ledger, queue, run lock).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Store not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store {} at line {line}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Address {address} is already recorded in the ledger")]
    DuplicateRecord { address: String },

    #[error("Another run holds the lock at {}", path.display())]
    Locked { path: PathBuf },
}

/// Recipient queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Recipient queue is empty")]
    Empty,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
}

/// Content generation errors. These abort only the current recipient.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generated content is empty")]
    EmptyContent,

    #[error("Generation service failed: {0}")]
    Provider(#[from] LlmError),
}

/// Delivery collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid {field} address {value:?}: {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Transport {transport} misconfigured: {reason}")]
    Config { transport: String, reason: String },

    #[error("Transport {transport} unavailable: {reason}")]
    Unavailable { transport: String, reason: String },

    #[error("Transport {transport} rejected the message: {reason}")]
    Rejected { transport: String, reason: String },

    #[error("Authentication failed for transport {transport}")]
    AuthFailed { transport: String },

    #[error("Transport {transport} rate limited")]
    RateLimited { transport: String },

    /// The transport failed after the message may have been handed off.
    #[error("Transport {transport} may have accepted the message: {reason}")]
    Uncertain { transport: String, reason: String },

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    /// Whether the recipient might have received the message anyway.
    pub fn may_have_delivered(&self) -> bool {
        matches!(
            self,
            DeliveryError::Timeout(_) | DeliveryError::Uncertain { .. }
        )
    }
}

/// Result type alias for outreach dispatch.
pub type Result<T> = std::result::Result<T, Error>;
