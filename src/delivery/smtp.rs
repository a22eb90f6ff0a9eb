//! SMTP delivery via lettre (STARTTLS relay, HTML body).

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::{Mailer, OutgoingEmail};
use crate::error::DeliveryError;

const TRANSPORT: &str = "smtp";

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// SMTP mailer. The transport is blocking, so sends run on the blocking pool.
pub struct SmtpMailer {
    transport: SmtpTransport,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Config {
                transport: TRANSPORT.into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport, timeout })
    }
}

/// Build the MIME message for `email`.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, DeliveryError> {
    let from_address: Address =
        email
            .from
            .email
            .parse()
            .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                field: "from",
                value: email.from.email.clone(),
                reason: e.to_string(),
            })?;
    let to_address: Address =
        email
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                field: "to",
                value: email.to.clone(),
                reason: e.to_string(),
            })?;

    Message::builder()
        .from(Mailbox::new(email.from.name.clone(), from_address))
        .to(Mailbox::new(None, to_address))
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|e| DeliveryError::Rejected {
            transport: TRANSPORT.into(),
            reason: format!("Failed to build email: {e}"),
        })
}

/// What an SMTP failure says about whether the message went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmtpFailure {
    Timeout,
    /// 5xx reply: the server refused the message.
    Permanent,
    /// 4xx reply: the server refused for now.
    Transient,
    /// Network, TLS or client error. The session may have reached DATA.
    Other,
}

impl SmtpFailure {
    fn of(e: &lettre::transport::smtp::Error) -> Self {
        if e.is_timeout() {
            SmtpFailure::Timeout
        } else if e.is_permanent() {
            SmtpFailure::Permanent
        } else if e.is_transient() {
            SmtpFailure::Transient
        } else {
            SmtpFailure::Other
        }
    }
}

fn map_smtp_failure(kind: SmtpFailure, reason: String, timeout: Duration) -> DeliveryError {
    match kind {
        SmtpFailure::Timeout => DeliveryError::Timeout(timeout),
        SmtpFailure::Permanent if reason.contains("535") => DeliveryError::AuthFailed {
            transport: TRANSPORT.into(),
        },
        SmtpFailure::Permanent => DeliveryError::Rejected {
            transport: TRANSPORT.into(),
            reason,
        },
        SmtpFailure::Transient => DeliveryError::Unavailable {
            transport: TRANSPORT.into(),
            reason: format!("SMTP send deferred: {reason}"),
        },
        SmtpFailure::Other => DeliveryError::Uncertain {
            transport: TRANSPORT.into(),
            reason: format!("SMTP send failed: {reason}"),
        },
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        TRANSPORT
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let message = build_message(email)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::Uncertain {
                transport: TRANSPORT.into(),
                reason: format!("SMTP send task failed: {e}"),
            })?
            .map_err(|e| map_smtp_failure(SmtpFailure::of(&e), e.to_string(), self.timeout))?;

        tracing::info!(to = %email.to, "Email sent via SMTP");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::SenderIdentity;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.into(),
            from: SenderIdentity::new("me@example.com").with_name("Outreach Desk"),
            subject: "Hello there".into(),
            html_body: "<p>Hi</p>".into(),
        }
    }

    #[test]
    fn builds_html_message() {
        let message = build_message(&email("jane.doe@example.org")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("Subject: Hello there"));
        assert!(raw.contains("jane.doe@example.org"));
        assert!(raw.contains("Outreach Desk"));
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let err = build_message(&email("not an address")).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { field: "to", .. }));
    }

    #[test]
    fn only_refusals_are_definite() {
        let timeout = Duration::from_secs(5);
        let map = |kind, reason: &str| map_smtp_failure(kind, reason.into(), timeout);

        assert!(matches!(map(SmtpFailure::Timeout, "read timed out"), DeliveryError::Timeout(t) if t == timeout));
        assert!(matches!(
            map(SmtpFailure::Permanent, "535 5.7.8 bad credentials"),
            DeliveryError::AuthFailed { .. }
        ));
        assert!(matches!(
            map(SmtpFailure::Permanent, "550 mailbox unavailable"),
            DeliveryError::Rejected { .. }
        ));
        assert!(matches!(
            map(SmtpFailure::Transient, "421 try again later"),
            DeliveryError::Unavailable { .. }
        ));

        let dropped = map(SmtpFailure::Other, "connection reset by peer");
        assert!(matches!(dropped, DeliveryError::Uncertain { .. }));
        assert!(dropped.may_have_delivered());
    }

    #[test]
    fn mailer_constructs_without_connecting() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let config = SmtpConfig {
            host: "smtp.test.com".into(),
            port: 587,
            username: "user".into(),
            password: SecretString::from("pass"),
        };
        let mailer = SmtpMailer::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(mailer.name(), "smtp");
    }
}
