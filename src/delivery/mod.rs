//! Outbound delivery: the narrow contract the dispatcher hands mail to.
//!
//! Backends:
//! - **SMTP**: STARTTLS relay via lettre
//! - **Brevo**: transactional email HTTP API via reqwest

pub mod brevo;
pub mod smtp;

pub use brevo::{BrevoConfig, BrevoMailer};
pub use smtp::{SmtpConfig, SmtpMailer};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeliveryError;

/// The identity outreach mail is sent as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub email: String,
    pub name: Option<String>,
}

impl SenderIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name to sign with; falls back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// A fully rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: SenderIdentity,
    pub subject: String,
    pub html_body: String,
}

/// Delivery backend. `Ok` means the service accepted the message; nothing
/// beyond that (bounces, opens) is observed.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

/// Which backend to build.
#[derive(Debug, Clone)]
pub enum DeliveryConfig {
    Smtp(SmtpConfig),
    Brevo(BrevoConfig),
}

/// Build the configured mailer. `timeout` bounds each network operation.
pub fn create_mailer(
    config: &DeliveryConfig,
    timeout: Duration,
) -> Result<Arc<dyn Mailer>, DeliveryError> {
    match config {
        DeliveryConfig::Smtp(smtp) => Ok(Arc::new(SmtpMailer::new(smtp, timeout)?)),
        DeliveryConfig::Brevo(brevo) => Ok(Arc::new(BrevoMailer::new(brevo, timeout)?)),
    }
}
