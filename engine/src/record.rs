//! Persisted highlight records and their validation rules.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tidemark_anchor::Anchor;

use crate::{
    clock::parse_iso8601,
    error::FieldError,
};

/// The conversation platform a highlight was captured on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    ChatGpt,
    Claude,
    Gemini,
    Custom(String),
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::ChatGpt => "chatgpt",
            Platform::Claude => "claude",
            Platform::Gemini => "gemini",
            Platform::Custom(name) => name.as_str(),
        }
    }

    pub fn from_str_name(name: &str) -> Platform {
        match name {
            "chatgpt" => Platform::ChatGpt,
            "claude" => Platform::Claude,
            "gemini" => Platform::Gemini,
            other => Platform::Custom(other.to_string()),
        }
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(de::Error::custom("platform must not be empty"));
        }
        Ok(Platform::from_str_name(&s))
    }
}

/// One stored annotation: an anchor plus user metadata.
///
/// Field names follow the persisted JSON layout; `created` and `updated`
/// are ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRecord {
    pub id: String,
    pub platform: Platform,
    pub conversation_id: String,
    pub message_id: String,
    pub anchor: Anchor,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: String,
    pub updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl HighlightRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_iso8601(&self.created)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_iso8601(&self.updated)
    }
}

/// `#` followed by exactly 3 or 6 hex digits.
pub fn is_valid_hex_color(s: &str) -> bool {
    let Some(digits) = s.strip_prefix('#') else {
        return false;
    };
    (digits.len() == 3 || digits.len() == 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Checks every persistence rule and returns the full list of violations.
pub fn validate_record(record: &HighlightRecord) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &'static str, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        });
    };

    if record.id.is_empty() {
        fail("id", "must not be empty");
    }
    if record.platform.as_str().is_empty() {
        fail("platform", "must be present");
    }
    if record.conversation_id.is_empty() {
        fail("conversationId", "must not be empty");
    }
    if record.message_id.is_empty() {
        fail("messageId", "must not be empty");
    }
    if record.anchor.selected_text.is_empty() {
        fail("anchor", "selected text must not be empty");
    }
    if record.anchor.end_offset <= record.anchor.start_offset {
        fail("anchor", "end offset must exceed start offset");
    }
    if !(0.0..=1.0).contains(&record.anchor.confidence) {
        fail("anchor", "confidence must lie in [0, 1]");
    }
    let created = parse_iso8601(&record.created);
    if created.is_none() {
        fail("created", "must be an ISO-8601 timestamp");
    }
    let updated = parse_iso8601(&record.updated);
    if updated.is_none() {
        fail("updated", "must be an ISO-8601 timestamp");
    }
    if let (Some(c), Some(u)) = (created, updated) {
        if c > u {
            fail("updated", "must not precede created");
        }
    }
    if let Some(color) = &record.color {
        if !is_valid_hex_color(color) {
            fail("color", "must be # followed by 3 or 6 hex digits");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
