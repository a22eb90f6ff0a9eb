//! Brevo transactional email API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use super::{Mailer, OutgoingEmail};
use crate::error::DeliveryError;

const TRANSPORT: &str = "brevo";

/// Default API host.
pub const DEFAULT_BREVO_URL: &str = "https://api.brevo.com";

#[derive(Debug, Clone)]
pub struct BrevoConfig {
    pub api_key: SecretString,
    pub base_url: String,
}

/// Sends one transactional email per call.
pub struct BrevoMailer {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl BrevoMailer {
    pub fn new(config: &BrevoConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Config {
                transport: TRANSPORT.into(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/v3/smtp/email", self.base_url)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Contact<'a>,
    to: [Contact<'a>; 1],
    subject: &'a str,
    html_content: &'a str,
}

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

fn request_body(email: &OutgoingEmail) -> SendRequest<'_> {
    SendRequest {
        sender: Contact {
            email: &email.from.email,
            name: email.from.name.as_deref(),
        },
        to: [Contact {
            email: &email.to,
            name: None,
        }],
        subject: &email.subject,
        html_content: &email.html_body,
    }
}

fn map_status(status: u16, body: String) -> DeliveryError {
    match status {
        401 | 403 => DeliveryError::AuthFailed {
            transport: TRANSPORT.into(),
        },
        429 => DeliveryError::RateLimited {
            transport: TRANSPORT.into(),
        },
        // The API may have queued the email before failing.
        500..=599 => DeliveryError::Uncertain {
            transport: TRANSPORT.into(),
            reason: format!("HTTP {status}: {body}"),
        },
        _ => DeliveryError::Rejected {
            transport: TRANSPORT.into(),
            reason: format!("HTTP {status}: {body}"),
        },
    }
}

/// Only a failed connect proves the request never left.
fn map_request_error(e: &reqwest::Error, timeout: Duration) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout(timeout)
    } else if e.is_connect() {
        DeliveryError::Unavailable {
            transport: TRANSPORT.into(),
            reason: e.to_string(),
        }
    } else {
        DeliveryError::Uncertain {
            transport: TRANSPORT.into(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    fn name(&self) -> &str {
        TRANSPORT
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(self.send_url())
            .header("api-key", self.api_key.expose_secret())
            .header("accept", "application/json")
            .json(&request_body(email))
            .send()
            .await
            .map_err(|e| map_request_error(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, to = %email.to, "Brevo rejected send");
            return Err(map_status(status.as_u16(), body));
        }

        info!(to = %email.to, "Email sent via Brevo");
        Ok(())
    }
}
