//! Structured filter criteria evaluated by `FilterQuery` executions

use crate::sources::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured constraints derived from a query (or built directly by correlation)
///
/// Matching rule: every structured criterion that is present must hold. When no
/// structured criterion is present the record must contain at least one term. A
/// criteria set with neither matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Minimum severity (1..=5), inclusive
    pub min_severity: Option<u8>,

    /// Only records whose own timestamp is at or after this instant
    pub since: Option<DateTime<Utc>>,

    /// Case-insensitive status equality
    pub status: Option<String>,

    /// Case-insensitive substring that must appear in the record text
    pub contains: Option<String>,

    /// Loose keywords; any one must appear when nothing structured is set
    #[serde(default)]
    pub terms: Vec<String>,
}

impl FilterCriteria {
    /// Criteria for an exact/substring entity match
    pub fn containing(value: impl Into<String>) -> Self {
        Self {
            contains: Some(value.into()),
            ..Default::default()
        }
    }

    /// True if any structured constraint is set
    pub fn is_structured(&self) -> bool {
        self.min_severity.is_some()
            || self.since.is_some()
            || self.status.is_some()
            || self.contains.is_some()
    }

    /// True if the criteria can match anything at all
    pub fn is_constrained(&self) -> bool {
        self.is_structured() || !self.terms.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.is_structured() {
            if self.terms.is_empty() {
                return false;
            }
            let text = record.searchable_text();
            return self.terms.iter().any(|t| text.contains(&t.to_lowercase()));
        }

        if let Some(min) = self.min_severity {
            match record.severity {
                Some(sev) if sev >= min => {}
                _ => return false,
            }
        }

        if let Some(since) = self.since {
            match record.timestamp() {
                Some(ts) if ts >= since => {}
                _ => return false,
            }
        }

        if let Some(status) = &self.status {
            match &record.status {
                Some(s) if s.eq_ignore_ascii_case(status) => {}
                _ => return false,
            }
        }

        if let Some(needle) = &self.contains {
            if needle.is_empty() || !record.searchable_text().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        true
    }
}
