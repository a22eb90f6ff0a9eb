//! Outreach data model: recipients, queue entries, send records, messages.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Greeting used when no name can be derived.
pub const GENERIC_NAME: &str = "there";
/// Organization placeholder when the domain says nothing useful.
pub const GENERIC_ORGANIZATION: &str = "your organization";
/// Focus placeholder when nothing can be inferred.
pub const GENERIC_FOCUS: &str = "your work";

/// `first.last`, `first_last` or `first-last`, optionally followed by digits.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{2,})[._-]([A-Za-z]{2,})\d*$").expect("valid name regex")
});

/// Mailbox providers whose domain carries no organization.
const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail", "googlemail", "yahoo", "outlook", "hotmail", "live", "icloud", "me", "aol",
    "proton", "protonmail", "gmx", "mail", "yandex", "zoho",
];

/// Second-level labels that sit under a country code (`co.uk`, `com.au`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu"];

/// Keyword → focus area, matched against the address.
const FOCUS_KEYWORDS: &[(&str, &str)] = &[
    ("tech", "technology"),
    ("science", "science"),
    ("health", "health"),
    ("climate", "climate and the environment"),
    ("green", "climate and the environment"),
    ("finance", "business and finance"),
    ("business", "business and finance"),
    ("politic", "politics"),
    ("sport", "sports"),
    ("investigat", "investigative reporting"),
    ("data", "data journalism"),
];

/// An entry in the recipient queue file.
///
/// Either a bare address string or an object with explicit personalization
/// fields, so hand-maintained lists stay terse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueEntry {
    Address(String),
    Detailed {
        email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        focus: Option<String>,
    },
}

impl QueueEntry {
    pub fn address(&self) -> &str {
        match self {
            QueueEntry::Address(address) => address,
            QueueEntry::Detailed { email, .. } => email,
        }
    }

    /// Build the recipient, preferring explicit fields over derived ones.
    pub fn to_recipient(&self) -> Recipient {
        match self {
            QueueEntry::Address(address) => Recipient::from_address(address),
            QueueEntry::Detailed {
                email,
                name,
                organization,
                focus,
            } => {
                let derived = Recipient::from_address(email);
                Recipient {
                    address: email.clone(),
                    name: non_blank(name).or(derived.name),
                    organization: non_blank(organization).or(derived.organization),
                    focus: non_blank(focus).or(derived.focus),
                }
            }
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A candidate recipient. The address is an opaque, case-sensitive key; the
/// other attributes only feed personalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    pub name: Option<String>,
    pub organization: Option<String>,
    pub focus: Option<String>,
}

impl Recipient {
    /// Derive display attributes from the address, best effort.
    pub fn from_address(address: &str) -> Self {
        let (local, domain) = match address.rsplit_once('@') {
            Some((local, domain)) => (local, domain),
            None => (address, ""),
        };

        Self {
            address: address.to_string(),
            name: derive_name(local),
            organization: derive_organization(domain),
            focus: derive_focus(address),
        }
    }

    /// Full display name, or the generic greeting.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(GENERIC_NAME)
    }

    pub fn first_name(&self) -> &str {
        self.name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or(GENERIC_NAME)
    }

    pub fn organization(&self) -> &str {
        self.organization.as_deref().unwrap_or(GENERIC_ORGANIZATION)
    }

    pub fn focus(&self) -> &str {
        self.focus.as_deref().unwrap_or(GENERIC_FOCUS)
    }
}

fn derive_name(local: &str) -> Option<String> {
    // Drop "+tag" sub-addressing.
    let local = local.split('+').next().unwrap_or(local);
    let caps = NAME_PATTERN.captures(local)?;
    Some(format!("{} {}", capitalize(&caps[1]), capitalize(&caps[2])))
}

fn derive_organization(domain: &str) -> Option<String> {
    let domain = domain.trim().to_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }

    let tld = labels[labels.len() - 1];
    let mut idx = labels.len() - 2;
    if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[idx]) {
        if idx == 0 {
            return None;
        }
        idx -= 1;
    }

    let label = labels[idx];
    if FREE_MAIL_DOMAINS.contains(&label) {
        return None;
    }
    Some(
        label
            .split('-')
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn derive_focus(address: &str) -> Option<String> {
    let lower = address.to_lowercase();
    FOCUS_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, focus)| focus.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// One confirmed send. Appended once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRecord {
    pub address: String,
    /// Host-local calendar date of the send; the quota counts by this.
    pub date: NaiveDate,
    pub sent_at: DateTime<Utc>,
}

impl SendRecord {
    pub fn new(address: impl Into<String>, when: DateTime<Local>) -> Self {
        Self {
            address: address.into(),
            date: when.date_naive(),
            sent_at: when.with_timezone(&Utc),
        }
    }
}

/// Generated email content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    /// HTML body, ready for the delivery transport.
    pub html_body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_from_dotted_local_part() {
        let r = Recipient::from_address("jane.doe@nytimes.com");
        assert_eq!(r.display_name(), "Jane Doe");
        assert_eq!(r.first_name(), "Jane");
        assert_eq!(r.organization(), "Nytimes");
    }

    #[test]
    fn name_pattern_tolerates_separators_digits_and_tags() {
        assert_eq!(
            Recipient::from_address("MARIA_LOPEZ2@x.org").name.as_deref(),
            Some("Maria Lopez")
        );
        assert_eq!(
            Recipient::from_address("li-wei+press@x.org").name.as_deref(),
            Some("Li Wei")
        );
    }

    #[test]
    fn unrecognized_local_part_falls_back_to_placeholders() {
        let r = Recipient::from_address("tips@gmail.com");
        assert_eq!(r.name, None);
        assert_eq!(r.display_name(), GENERIC_NAME);
        assert_eq!(r.first_name(), GENERIC_NAME);
        assert_eq!(r.organization(), GENERIC_ORGANIZATION);
        assert_eq!(r.focus(), GENERIC_FOCUS);
    }

    #[test]
    fn garbage_address_degrades_gracefully() {
        let r = Recipient::from_address("not-an-address");
        assert_eq!(r.address, "not-an-address");
        assert_eq!(r.organization, None);
    }

    #[test]
    fn organization_skips_country_second_level() {
        assert_eq!(
            Recipient::from_address("a@news.bbc.co.uk").organization.as_deref(),
            Some("Bbc")
        );
        assert_eq!(
            Recipient::from_address("a@the-verge.com").organization.as_deref(),
            Some("The Verge")
        );
    }

    #[test]
    fn focus_inferred_from_keywords() {
        assert_eq!(
            Recipient::from_address("desk@techcrunch.com").focus.as_deref(),
            Some("technology")
        );
    }

    #[test]
    fn queue_entry_accepts_both_shapes() {
        let entries: Vec<QueueEntry> = serde_json::from_str(
            r#"["a@x.com", {"email": "b@x.com", "name": "Bea Smith"}]"#,
        )
        .unwrap();
        assert_eq!(entries[0], QueueEntry::Address("a@x.com".into()));
        assert_eq!(entries[1].address(), "b@x.com");
        assert_eq!(entries[1].to_recipient().first_name(), "Bea");
    }

    #[test]
    fn explicit_fields_override_derivation() {
        let entry = QueueEntry::Detailed {
            email: "jane.doe@nytimes.com".into(),
            name: Some("  ".into()),
            organization: Some("The New York Times".into()),
            focus: None,
        };
        let r = entry.to_recipient();
        assert_eq!(r.display_name(), "Jane Doe");
        assert_eq!(r.organization(), "The New York Times");
    }

    #[test]
    fn send_record_uses_local_date() {
        let when = Local::now();
        let record = SendRecord::new("a@x.com", when);
        assert_eq!(record.date, when.date_naive());
        assert_eq!(record.sent_at, when.with_timezone(&Utc));
    }
}
