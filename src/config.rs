//! Configuration types, read once from the environment at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::delivery::brevo::DEFAULT_BREVO_URL;
use crate::delivery::{BrevoConfig, DeliveryConfig, SenderIdentity, SmtpConfig};
use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig};
use crate::outreach::quota::DEFAULT_MAX_PER_DAY;
use crate::retry::RetryPolicy;

const DEFAULT_QUEUE_PATH: &str = "./data/queue.json";
const DEFAULT_LEDGER_PATH: &str = "./data/sent.jsonl";
const DEFAULT_FALLBACK_SUBJECT: &str = "Quick introduction";

/// Where the template body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateBody {
    Inline(String),
    File(PathBuf),
}

impl TemplateBody {
    pub fn load(&self) -> Result<String, ConfigError> {
        match self {
            TemplateBody::Inline(body) => Ok(body.clone()),
            TemplateBody::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// How message content is produced.
#[derive(Debug, Clone)]
pub enum ContentConfig {
    Template {
        subject: String,
        body: TemplateBody,
    },
    Ai {
        llm: LlmConfig,
        /// What the outreach is about; `None` keeps the built-in description.
        pitch: Option<String>,
        fallback_subject: String,
    },
}

/// Full configuration for one invocation.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    pub queue_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Exclusive run lock; defaults to the ledger path plus `.lock`.
    pub lock_path: PathBuf,
    pub max_per_day: u32,
    /// Dispatch attempts per `send` invocation.
    pub dispatches_per_run: usize,
    pub requeue_on_failure: bool,
    pub sender: SenderIdentity,
    pub content: ContentConfig,
    pub delivery: DeliveryConfig,
    /// Timeout and retry budget for every external call.
    pub retry: RetryPolicy,
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl OutreachConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let ledger_path = PathBuf::from(env.get_or("OUTREACH_LEDGER_PATH", DEFAULT_LEDGER_PATH));
        let lock_path = env
            .get("OUTREACH_LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_lock_path(&ledger_path));

        let dispatches_per_run: usize = env.parse_or("OUTREACH_DISPATCHES_PER_RUN", 1)?;
        if dispatches_per_run == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_DISPATCHES_PER_RUN".into(),
                message: "must be at least 1".into(),
            });
        }

        let sender_email = env.require(
            "OUTREACH_SENDER_EMAIL",
            "Set the address outreach mail is sent from",
        )?;
        let mut sender = SenderIdentity::new(sender_email.clone());
        if let Some(name) = env.get("OUTREACH_SENDER_NAME") {
            sender = sender.with_name(name);
        }

        let timeout_secs: u64 = env.parse_or("OUTREACH_HTTP_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_HTTP_TIMEOUT_SECS".into(),
                message: "must be at least 1".into(),
            });
        }
        let timeout = Duration::from_secs(timeout_secs);
        let retry = RetryPolicy::new(timeout, env.parse_or("OUTREACH_MAX_RETRIES", 0)?);

        Ok(Self {
            queue_path: PathBuf::from(env.get_or("OUTREACH_QUEUE_PATH", DEFAULT_QUEUE_PATH)),
            ledger_path,
            lock_path,
            max_per_day: env.parse_or("OUTREACH_MAX_PER_DAY", DEFAULT_MAX_PER_DAY)?,
            dispatches_per_run,
            requeue_on_failure: env.flag("OUTREACH_REQUEUE_ON_FAILURE")?,
            sender,
            content: content_config(&env)?,
            delivery: delivery_config(&env, &sender_email)?,
            retry,
            log_dir: env.get("OUTREACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn default_lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn content_config<F>(env: &Env<F>) -> Result<ContentConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env.get_or("OUTREACH_CONTENT_MODE", "template").to_lowercase().as_str() {
        "template" => {
            let subject = env.require(
                "OUTREACH_TEMPLATE_SUBJECT",
                "Template mode needs a subject, e.g. \"Working with {organization}\"",
            )?;
            let body = match (env.get("OUTREACH_TEMPLATE_BODY"), env.get("OUTREACH_TEMPLATE_BODY_FILE")) {
                (Some(body), _) => TemplateBody::Inline(body),
                (None, Some(path)) => TemplateBody::File(PathBuf::from(path)),
                (None, None) => {
                    return Err(ConfigError::MissingRequired {
                        key: "OUTREACH_TEMPLATE_BODY".into(),
                        hint: "Set OUTREACH_TEMPLATE_BODY or OUTREACH_TEMPLATE_BODY_FILE".into(),
                    });
                }
            };
            Ok(ContentConfig::Template { subject, body })
        }
        "ai" => {
            let api_key = env.require("LLM_API_KEY", "AI mode needs an API key for the LLM endpoint")?;
            Ok(ContentConfig::Ai {
                llm: LlmConfig {
                    api_key: SecretString::from(api_key),
                    base_url: env.get_or("LLM_BASE_URL", DEFAULT_BASE_URL),
                    model: env.get_or("LLM_MODEL", DEFAULT_MODEL),
                },
                pitch: env.get("OUTREACH_PITCH"),
                fallback_subject: env.get_or("OUTREACH_FALLBACK_SUBJECT", DEFAULT_FALLBACK_SUBJECT),
            })
        }
        other => Err(ConfigError::InvalidValue {
            key: "OUTREACH_CONTENT_MODE".into(),
            message: format!("expected \"template\" or \"ai\", got {other:?}"),
        }),
    }
}

fn delivery_config<F>(env: &Env<F>, sender_email: &str) -> Result<DeliveryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env.get_or("OUTREACH_TRANSPORT", "smtp").to_lowercase().as_str() {
        "smtp" => Ok(DeliveryConfig::Smtp(SmtpConfig {
            host: env.require("SMTP_HOST", "Set the SMTP relay host, e.g. smtp.gmail.com")?,
            port: env.parse_or("SMTP_PORT", 587)?,
            username: env.get_or("EMAIL_USERNAME", sender_email),
            password: SecretString::from(env.get_or("EMAIL_PASSWORD", "")),
        })),
        "brevo" => Ok(DeliveryConfig::Brevo(BrevoConfig {
            api_key: SecretString::from(env.require("BREVO_API_KEY", "Brevo transport needs an API key")?),
            base_url: env.get_or("BREVO_BASE_URL", DEFAULT_BREVO_URL),
        })),
        other => Err(ConfigError::InvalidValue {
            key: "OUTREACH_TRANSPORT".into(),
            message: format!("expected \"smtp\" or \"brevo\", got {other:?}"),
        }),
    }
}

/// Typed accessors over a key lookup.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str, hint: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("OUTREACH_SENDER_EMAIL", "me@example.com"),
        ("OUTREACH_TEMPLATE_SUBJECT", "Hello {first_name}"),
        ("OUTREACH_TEMPLATE_BODY", "Hi {name}"),
        ("SMTP_HOST", "smtp.example.com"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = MINIMAL.to_vec();
        pairs.retain(|(k, _)| !extra.iter().any(|(e, _)| e == k));
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = OutreachConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.queue_path, PathBuf::from("./data/queue.json"));
        assert_eq!(config.ledger_path, PathBuf::from("./data/sent.jsonl"));
        assert_eq!(config.lock_path, PathBuf::from("./data/sent.jsonl.lock"));
        assert_eq!(config.max_per_day, 250);
        assert_eq!(config.dispatches_per_run, 1);
        assert!(!config.requeue_on_failure);
        assert_eq!(config.sender, SenderIdentity::new("me@example.com"));
        assert_eq!(config.retry.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.log_dir.is_none());

        match config.content {
            ContentConfig::Template { subject, body } => {
                assert_eq!(subject, "Hello {first_name}");
                assert_eq!(body, TemplateBody::Inline("Hi {name}".into()));
            }
            other => panic!("expected template content, got {other:?}"),
        }
        match config.delivery {
            DeliveryConfig::Smtp(smtp) => {
                assert_eq!(smtp.host, "smtp.example.com");
                assert_eq!(smtp.port, 587);
                assert_eq!(smtp.username, "me@example.com");
            }
            other => panic!("expected smtp, got {other:?}"),
        }
    }

    #[test]
    fn missing_sender_is_reported() {
        let pairs = with(&[("OUTREACH_SENDER_EMAIL", "  ")]);
        let err = OutreachConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "OUTREACH_SENDER_EMAIL"));
    }

    #[test]
    fn invalid_number_is_reported() {
        let pairs = with(&[("OUTREACH_MAX_PER_DAY", "lots")]);
        let err = OutreachConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "OUTREACH_MAX_PER_DAY"));
    }

    #[test]
    fn zero_dispatches_rejected() {
        let pairs = with(&[("OUTREACH_DISPATCHES_PER_RUN", "0")]);
        assert!(OutreachConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let pairs = with(&[("OUTREACH_HTTP_TIMEOUT_SECS", "0")]);
        let err = OutreachConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "OUTREACH_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn retries_are_clamped() {
        let pairs = with(&[("OUTREACH_MAX_RETRIES", "3"), ("OUTREACH_HTTP_TIMEOUT_SECS", "5")]);
        let config = OutreachConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.timeout, Duration::from_secs(5));
    }

    #[test]
    fn flags_parse() {
        for (raw, expected) in [("true", true), ("YES", true), ("1", true), ("off", false)] {
            let pairs = with(&[("OUTREACH_REQUEUE_ON_FAILURE", raw)]);
            let config = OutreachConfig::from_lookup(lookup(&pairs)).unwrap();
            assert_eq!(config.requeue_on_failure, expected, "value {raw}");
        }
        let pairs = with(&[("OUTREACH_REQUEUE_ON_FAILURE", "maybe")]);
        assert!(OutreachConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn template_body_file_and_missing_body() {
        let pairs: Vec<_> = MINIMAL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "OUTREACH_TEMPLATE_BODY")
            .collect();
        let err = OutreachConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));

        let mut pairs = pairs;
        pairs.push(("OUTREACH_TEMPLATE_BODY_FILE", "/tmp/body.txt"));
        let config = OutreachConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(
            config.content,
            ContentConfig::Template { body: TemplateBody::File(_), .. }
        ));
    }

    #[test]
    fn template_body_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.txt");
        std::fs::write(&path, "Hello {name}").unwrap();
        assert_eq!(TemplateBody::File(path).load().unwrap(), "Hello {name}");
        assert!(TemplateBody::File(dir.path().join("missing.txt")).load().is_err());
    }

    #[test]
    fn ai_mode_with_brevo() {
        let pairs = with(&[
            ("OUTREACH_CONTENT_MODE", "ai"),
            ("LLM_API_KEY", "sk-or-test"),
            ("OUTREACH_TRANSPORT", "brevo"),
            ("BREVO_API_KEY", "xkeysib-test"),
            ("OUTREACH_SENDER_NAME", "Sam"),
        ]);
        let config = OutreachConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.sender.display_name(), "Sam");

        match config.content {
            ContentConfig::Ai {
                llm,
                pitch,
                fallback_subject,
            } => {
                assert_eq!(llm.api_key.expose_secret(), "sk-or-test");
                assert_eq!(llm.base_url, DEFAULT_BASE_URL);
                assert_eq!(llm.model, DEFAULT_MODEL);
                assert!(pitch.is_none());
                assert_eq!(fallback_subject, "Quick introduction");
            }
            other => panic!("expected ai content, got {other:?}"),
        }
        match config.delivery {
            DeliveryConfig::Brevo(brevo) => assert_eq!(brevo.base_url, DEFAULT_BREVO_URL),
            other => panic!("expected brevo, got {other:?}"),
        }
    }

    #[test]
    fn ai_mode_requires_key() {
        let pairs = with(&[("OUTREACH_CONTENT_MODE", "ai")]);
        let err = OutreachConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "LLM_API_KEY"));
    }

    #[test]
    fn unknown_modes_rejected() {
        let pairs = with(&[("OUTREACH_CONTENT_MODE", "magic")]);
        assert!(OutreachConfig::from_lookup(lookup(&pairs)).is_err());
        let pairs = with(&[("OUTREACH_TRANSPORT", "pigeon")]);
        assert!(OutreachConfig::from_lookup(lookup(&pairs)).is_err());
    }
}
