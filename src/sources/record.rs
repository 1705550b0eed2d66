//! Security records returned by the source executors

use crate::sources::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single record held by one of the backing stores (alert, incident, asset, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier, unique within its source kind
    pub id: String,

    /// Owning organization; every lookup is scoped to it
    pub organization_id: String,

    /// Which entity kind this record belongs to
    pub kind: SourceKind,

    /// Human title (alerts, incidents, playbooks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Name (assets, indicators)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Severity on a 1..=5 scale (5 = critical)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,

    /// Free-form source-specific fields (ips, hashes, hostnames, ...)
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl Record {
    /// Create a minimal record; remaining fields are filled with the `with_*` helpers
    pub fn new(kind: SourceKind, id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            kind,
            title: None,
            name: None,
            description: String::new(),
            severity: None,
            status: None,
            created_at: None,
            event_time: None,
            first_seen: None,
            attributes: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn with_event_time(mut self, ts: DateTime<Utc>) -> Self {
        self.event_time = Some(ts);
        self
    }

    pub fn with_first_seen(mut self, ts: DateTime<Utc>) -> Self {
        self.first_seen = Some(ts);
        self
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// Title if present, otherwise name, otherwise the id
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    /// The record's own timestamp: creation, then event, then first-seen
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.event_time).or(self.first_seen)
    }

    /// Every human-readable field joined by spaces, as stored
    ///
    /// Covers title, name, description, status and the string and number
    /// leaves of the attributes. Identifiers and ownership fields are excluded.
    pub fn raw_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title.clone());
        }
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if let Some(status) = &self.status {
            parts.push(status.clone());
        }
        collect_json_strings(&self.attributes, &mut parts);
        parts.join(" ")
    }

    /// Lowercased [`raw_text`](Self::raw_text), used for matching
    pub fn searchable_text(&self) -> String {
        self.raw_text().to_lowercase()
    }

    /// Text handed to the embedding provider
    pub fn embedding_text(&self) -> String {
        let mut text = String::from(self.display_name());
        if !self.description.is_empty() {
            text.push_str(". ");
            text.push_str(&self.description);
        }
        text
    }

    /// Verbatim (case-sensitive) containment check over [`raw_text`](Self::raw_text)
    pub fn contains_verbatim(&self, needle: &str) -> bool {
        !needle.is_empty() && self.raw_text().contains(needle)
    }
}

fn collect_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Number(n) => out.push(n.to_string()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_json_strings(v, out);
            }
        }
        serde_json::Value::Bool(_) | serde_json::Value::Null => {}
    }
}
