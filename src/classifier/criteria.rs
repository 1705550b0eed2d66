//! Identifier and filter-criteria extraction from query text

use super::tags::TagDetector;
use crate::sources::FilterCriteria;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "from", "with", "all", "any", "are", "was", "were", "this", "that",
    "these", "those", "what", "which", "who", "whom", "how", "when", "where", "into", "about",
    "over", "our", "out", "have", "has", "had", "not", "but", "can", "you", "your", "there",
    "their", "them", "they", "its", "per", "via", "did", "does", "been", "being", "more",
    "most", "some", "such", "only", "than", "then", "also", "just", "between", "during",
    "please", "me", "related", "each", "every",
];

const STATUS_WORDS: &[&str] = &["open", "closed", "resolved", "active", "investigating"];

pub struct CriteriaExtractor {
    identifier: Regex,
    severity: Regex,
    status: Regex,
    numbered_window: Regex,
    unit_window: Regex,
    day_window: Regex,
    this_window: Regex,
    word: Regex,
}

impl CriteriaExtractor {
    pub fn new() -> Self {
        Self {
            identifier: super::compile(
                r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
            ),
            severity: super::compile(r"(?i)\b(critical|high|severe|urgent|medium|low)\b"),
            status: super::compile(r"(?i)\b(open|closed|resolved|active|investigating)\b"),
            numbered_window: super::compile(
                r"(?i)\b(?:last|past)\s+(\d{1,4})\s*(minutes?|mins?|hours?|hrs?|h|days?|d|weeks?|w|months?)\b",
            ),
            unit_window: super::compile(r"(?i)\b(?:last|past)\s+(hour|day|week|month)\b"),
            day_window: super::compile(r"(?i)\b(today|yesterday|24\s*h(?:ours?|rs?)?)\b"),
            this_window: super::compile(r"(?i)\bthis\s+(week|month)\b"),
            word: super::compile(r"[A-Za-z0-9][A-Za-z0-9._\-]*"),
        }
    }

    /// Canonical identifiers in the text, lowercased, first-seen order, no duplicates
    pub fn identifiers(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in self.identifier.find_iter(text) {
            let Ok(parsed) = uuid::Uuid::parse_str(m.as_str()) else {
                continue;
            };
            let id = parsed.hyphenated().to_string();
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub fn criteria(&self, text: &str, tags: &TagDetector, now: DateTime<Utc>) -> FilterCriteria {
        FilterCriteria {
            min_severity: self.min_severity(text),
            since: self.window(text).map(|d| now - d),
            status: self
                .status
                .captures(text)
                .map(|c| c[1].to_lowercase()),
            contains: None,
            terms: self.terms(text, tags),
        }
    }

    /// Lowest severity level mentioned, so "critical or high" keeps both
    fn min_severity(&self, text: &str) -> Option<u8> {
        self.severity
            .captures_iter(text)
            .map(|c| match c[1].to_lowercase().as_str() {
                "critical" => 5,
                "high" | "severe" | "urgent" => 4,
                "medium" => 3,
                _ => 2,
            })
            .min()
    }

    fn window(&self, text: &str) -> Option<Duration> {
        if let Some(c) = self.numbered_window.captures(text) {
            let n: i64 = c[1].parse().ok()?;
            return Some(unit_duration(&c[2].to_lowercase(), n));
        }
        if let Some(c) = self.unit_window.captures(text) {
            return Some(unit_duration(&c[1].to_lowercase(), 1));
        }
        if let Some(c) = self.day_window.captures(text) {
            return Some(if c[1].eq_ignore_ascii_case("yesterday") {
                Duration::hours(48)
            } else {
                Duration::hours(24)
            });
        }
        if let Some(c) = self.this_window.captures(text) {
            return Some(unit_duration(&c[1].to_lowercase(), 1));
        }
        None
    }

    fn terms(&self, text: &str, tags: &TagDetector) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for m in self.word.find_iter(text) {
            let word = m
                .as_str()
                .trim_end_matches(|c: char| c == '.' || c == '-' || c == '_')
                .to_lowercase();
            if word.len() < 3
                || word.chars().all(|c| c.is_ascii_digit())
                || STOP_WORDS.contains(&word.as_str())
                || STATUS_WORDS.contains(&word.as_str())
                || self.identifier.is_match(&word)
                || tags.is_keyword(&word)
                || terms.contains(&word)
            {
                continue;
            }
            terms.push(word);
        }
        terms
    }
}

impl Default for CriteriaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn unit_duration(unit: &str, n: i64) -> Duration {
    match unit {
        u if u.starts_with("min") => Duration::minutes(n),
        u if u.starts_with('h') => Duration::hours(n),
        u if u.starts_with('d') => Duration::days(n),
        u if u.starts_with('w') => Duration::weeks(n),
        _ => Duration::days(30 * n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn extract(text: &str) -> FilterCriteria {
        CriteriaExtractor::new().criteria(text, &TagDetector::new(), now())
    }

    #[test]
    fn test_identifiers_dedupe_and_lowercase() {
        let ex = CriteriaExtractor::new();
        let ids = ex.identifiers(
            "A1B2C3D4-E5F6-7890-ABCD-EF1234567890 and a1b2c3d4-e5f6-7890-abcd-ef1234567890, \
             then 00000000-0000-0000-0000-000000000001",
        );
        assert_eq!(
            ids,
            vec![
                "a1b2c3d4-e5f6-7890-abcd-ef1234567890",
                "00000000-0000-0000-0000-000000000001"
            ]
        );
        assert!(ex.identifiers("a1b2c3d4-e5f6-7890-abcd-ef12345678901").is_empty());
    }

    #[test]
    fn test_severity_and_window() {
        let c = extract("show critical alerts from the last 24 hours");
        assert_eq!(c.min_severity, Some(5));
        assert_eq!(c.since, Some(now() - Duration::hours(24)));
        assert!(c.terms.is_empty());
    }

    #[test]
    fn test_lowest_severity_wins() {
        assert_eq!(extract("critical or high incidents").min_severity, Some(4));
        assert_eq!(extract("urgent").min_severity, Some(4));
        assert_eq!(extract("nothing here").min_severity, None);
    }

    #[test]
    fn test_time_windows() {
        assert_eq!(extract("past 3 days").since, Some(now() - Duration::days(3)));
        assert_eq!(extract("last 15 minutes").since, Some(now() - Duration::minutes(15)));
        assert_eq!(extract("last week").since, Some(now() - Duration::weeks(1)));
        assert_eq!(extract("this month").since, Some(now() - Duration::days(30)));
        assert_eq!(extract("yesterday").since, Some(now() - Duration::hours(48)));
        assert_eq!(extract("alerts today").since, Some(now() - Duration::hours(24)));
        assert_eq!(extract("lateral movement").since, None);
    }

    #[test]
    fn test_status_and_terms() {
        let c = extract("find open incidents involving mimikatz on the domain controller");
        assert_eq!(c.status.as_deref(), Some("open"));
        assert_eq!(c.terms, vec!["involving", "mimikatz", "domain", "controller"]);
    }

    #[test]
    fn test_terms_keep_dotted_values() {
        let c = extract("anything about evil.example.com?");
        assert_eq!(c.terms, vec!["anything", "evil.example.com"]);
    }
}
