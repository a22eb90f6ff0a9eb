//! Content generation: static template or LLM-written copy.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, GenerationError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::outreach::model::{Message, Recipient};
use crate::retry::{self, RetryPolicy};

/// `{placeholder}` in templates.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// A `Subject:` line, tolerating markdown emphasis/heading markers.
static SUBJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[#*_\s]*subject(?:\s+line)?\s*[*_]*\s*:\s*[*_]*\s*(.*?)[*_\s]*$")
        .expect("valid subject regex")
});

/// How many leading non-empty lines may hold the subject.
const SUBJECT_SEARCH_LINES: usize = 3;

/// Produces the subject and body for one recipient.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, recipient: &Recipient) -> Result<Message, GenerationError>;
}

// ── Template ────────────────────────────────────────────────────────

/// Fixed subject/body with `{placeholder}` interpolation.
///
/// Known placeholders: `name`, `first_name`, `organization`, `focus`,
/// `email`, `sender_name`. Unknown ones are left untouched.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    subject: String,
    body: String,
    sender_name: String,
}

impl TemplateGenerator {
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let subject = subject.into();
        let body = body.into();
        if subject.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "OUTREACH_TEMPLATE_SUBJECT".into(),
                hint: "Template mode needs a subject".into(),
            });
        }
        if body.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "OUTREACH_TEMPLATE_BODY".into(),
                hint: "Template mode needs a body".into(),
            });
        }
        Ok(Self {
            subject,
            body,
            sender_name: sender_name.into(),
        })
    }

    fn lookup<'a>(&'a self, key: &str, recipient: &'a Recipient) -> Option<&'a str> {
        match key {
            "name" => Some(recipient.display_name()),
            "first_name" => Some(recipient.first_name()),
            "organization" => Some(recipient.organization()),
            "focus" => Some(recipient.focus()),
            "email" => Some(recipient.address.as_str()),
            "sender_name" => Some(self.sender_name.as_str()),
            _ => None,
        }
    }

    fn render(&self, template: &str, recipient: &Recipient, escape: bool) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match self.lookup(&caps[1], recipient) {
                Some(value) if escape => escape_html(value),
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, recipient: &Recipient) -> Result<Message, GenerationError> {
        let subject = self.render(&self.subject, recipient, false);
        let html_body = if looks_like_html(&self.body) {
            self.render(&self.body, recipient, true)
        } else {
            text_to_html(&self.render(&self.body, recipient, false))
        };

        Ok(Message {
            subject: single_line(&subject),
            html_body,
        })
    }
}

// ── AI ──────────────────────────────────────────────────────────────

/// Settings for LLM-written outreach.
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// Who the email is from, used in the prompt and sign-off.
    pub sender_name: String,
    /// What the outreach is about.
    pub pitch: String,
    /// Subject when the model does not provide one.
    pub fallback_subject: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            sender_name: "The team".to_string(),
            pitch: "an AI-assisted initiative that helps journalists find patterns in public \
                    data and supports investigative and social-good reporting"
                .to_string(),
            fallback_subject: "Quick introduction".to_string(),
            temperature: 0.7,
            max_tokens: 600,
        }
    }
}

/// Generates copy through an [`LlmProvider`].
pub struct AiGenerator {
    llm: Arc<dyn LlmProvider>,
    settings: AiSettings,
    retry: RetryPolicy,
}

impl AiGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, settings: AiSettings, retry: RetryPolicy) -> Self {
        Self {
            llm,
            settings,
            retry,
        }
    }
}

/// Build the prompt pair for `recipient`. Same input, same prompt.
pub fn build_prompt(recipient: &Recipient, settings: &AiSettings) -> (String, String) {
    let system = format!(
        "You write short, warm, personal outreach emails on behalf of {sender}. \
         Write like a real person, not a marketer. No placeholders, no brackets.\n\n\
         Format:\n\
         - First line: `Subject: <subject>`\n\
         - Then a blank line, then the plain-text body (3-5 short paragraphs)\n\
         - Sign off as {sender}",
        sender = settings.sender_name
    );

    let user = format!(
        "Write an outreach email.\n\
         Recipient name: {name}\n\
         Recipient organization: {organization}\n\
         Recipient focus: {focus}\n\
         Recipient email: {email}\n\n\
         What we are reaching out about: {pitch}\n\
         Invite them to reply if they are interested in collaborating.",
        name = recipient.display_name(),
        organization = recipient.organization(),
        focus = recipient.focus(),
        email = recipient.address,
        pitch = settings.pitch,
    );

    (system, user)
}

/// Split generated text into subject and HTML body.
///
/// A `Subject:` line among the first few non-empty lines becomes the subject;
/// otherwise `fallback_subject` is used and the whole text is the body.
pub fn parse_generated(text: &str, fallback_subject: &str) -> Result<Message, GenerationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyContent);
    }

    let lines: Vec<&str> = text.lines().collect();
    let subject_at = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(SUBJECT_SEARCH_LINES)
        .find_map(|(idx, line)| {
            SUBJECT_LINE
                .captures(line)
                .map(|caps| (idx, caps[1].trim().trim_matches('"').to_string()))
        })
        .filter(|(_, subject)| !subject.is_empty());

    let (subject, body) = match subject_at {
        Some((idx, subject)) => (subject, lines[idx + 1..].join("\n")),
        None => (fallback_subject.to_string(), text.to_string()),
    };

    let body = body.trim();
    if body.is_empty() {
        return Err(GenerationError::EmptyContent);
    }

    Ok(Message {
        subject: single_line(&subject),
        html_body: text_to_html(body),
    })
}

#[async_trait]
impl ContentGenerator for AiGenerator {
    fn name(&self) -> &str {
        "ai"
    }

    async fn generate(&self, recipient: &Recipient) -> Result<Message, GenerationError> {
        let (system, user) = build_prompt(recipient, &self.settings);
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        debug!(address = %recipient.address, model = %self.llm.model_name(), "Generating outreach copy");

        let response = retry::with_policy(&self.retry, "generation", || {
            self.llm.complete(request.clone())
        })
        .await?;

        let message = parse_generated(&response.content, &self.settings.fallback_subject)
            .inspect_err(|_| warn!(address = %recipient.address, "Model returned no usable content"))?;

        info!(
            address = %recipient.address,
            subject = %message.subject,
            output_tokens = response.output_tokens,
            "Generated outreach copy"
        );
        Ok(message)
    }
}

// ── HTML helpers ────────────────────────────────────────────────────

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Plain text to HTML: blank lines separate `<p>` paragraphs, single
/// newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
        .iter()
        .map(|lines| {
            let escaped: Vec<String> = lines.iter().map(|l| escape_html(l)).collect();
            format!("<p>{}</p>", escaped.join("<br>\n"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn looks_like_html(body: &str) -> bool {
    body.trim_start().starts_with('<')
}

/// Subjects must be a single line.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
