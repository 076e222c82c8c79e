//! # Normalized Item Model
//!
//! The record shape every source adapter must produce before anything reaches
//! the merge pipeline. Source-specific quirks stop at the adapter boundary;
//! from here on the feed only sees `NormalizedItem`.
//!
//! - `id` is always `<source>_<native-id>`, so two sources can never collide.
//! - `author` is never empty (adapters fall back to [`UNKNOWN_AUTHOR`]).
//! - `metadata` is opaque except for [`CONVERSATION_ID_KEY`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Sentinel used when a source does not report a username.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Reserved metadata key read by the conversation thread filter.
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

/// Source tag. Small open set: unknown tags round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Twitter,
    Reddit,
    Github,
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Twitter => "twitter",
            Source::Reddit => "reddit",
            Source::Github => "github",
            Source::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "twitter" | "x" => Source::Twitter,
            "reddit" => Source::Reddit,
            "github" => Source::Github,
            _ => Source::Other(s),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::from(s.to_string())
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        match s {
            Source::Other(v) => v,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One post in the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedItem {
    pub id: String,
    pub source: Source,
    pub author: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NormalizedItem {
    /// Build an item with a structurally unique id and a non-empty author.
    pub fn new(
        source: Source,
        native_id: &str,
        author: &str,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let author = author.trim();
        Self {
            id: make_id(&source, native_id),
            source,
            author: if author.is_empty() {
                UNKNOWN_AUTHOR.to_string()
            } else {
                author.to_string()
            },
            content,
            url: None,
            timestamp,
            category: None,
            metadata: Map::new(),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Conversation id, if the adapter attached one. Numeric ids are accepted
    /// because some scrapers emit them unquoted.
    pub fn conversation_id(&self) -> Option<String> {
        match self.metadata.get(CONVERSATION_ID_KEY)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// `<source>_<native-id>`
pub fn make_id(source: &Source, native_id: &str) -> String {
    format!("{}_{}", source.as_str(), native_id.trim())
}

/// Collapse whitespace and cap to `max_chars` characters (ellipsis appended
/// when truncated). HTML entities are decoded first since Reddit and GitHub
/// both escape them in JSON payloads.
pub fn normalize_content(raw: &str, max_chars: usize) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(raw);
    let out = re_ws.replace_all(&decoded, " ");
    let out = out.trim();

    if max_chars == 0 || out.chars().count() <= max_chars {
        return out.to_string();
    }
    let mut cut: String = out.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
