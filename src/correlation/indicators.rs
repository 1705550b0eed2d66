//! Indicator-of-compromise extraction
//!
//! Pulls typed indicators (IPv4, URL, domain, email, file hashes, CVE ids) out
//! of free text and infers the kind of a bare value.

use crate::error::{FerretError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Kind of entity value a correlation starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    IpAddress,
    Domain,
    Url,
    FileHash,
    Email,
    Hostname,
    User,
    Cve,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpAddress => "ip_address",
            Self::Domain => "domain",
            Self::Url => "url",
            Self::FileHash => "file_hash",
            Self::Email => "email",
            Self::Hostname => "hostname",
            Self::User => "user",
            Self::Cve => "cve",
        }
    }

    /// Infer the kind of a bare value; `None` when nothing recognisable matches
    pub fn detect(value: &str) -> Option<EntityKind> {
        let value = value.trim();
        let ex = IndicatorExtractor::shared();
        let full = |re: &Regex| re.find(value).map_or(false, |m| m.start() == 0 && m.end() == value.len());

        if full(&ex.url) {
            Some(Self::Url)
        } else if full(&ex.email) {
            Some(Self::Email)
        } else if full(&ex.ipv4) && valid_ipv4(value) {
            Some(Self::IpAddress)
        } else if full(&ex.cve) {
            Some(Self::Cve)
        } else if hash_algorithm(value).is_some() {
            Some(Self::FileHash)
        } else if full(&ex.domain) {
            Some(Self::Domain)
        } else {
            None
        }
    }

    /// Whether a value plausibly is of this kind
    pub fn accepts(&self, value: &str) -> bool {
        match (self, Self::detect(value)) {
            (Self::User, _) => !value.trim().is_empty(),
            (Self::Hostname, Some(Self::Domain)) | (Self::Hostname, Some(Self::IpAddress)) => true,
            (Self::Hostname, None) => value
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.'),
            (kind, Some(detected)) => *kind == detected,
            (_, None) => false,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = FerretError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ip" | "ip_address" | "ipv4" => Ok(Self::IpAddress),
            "domain" => Ok(Self::Domain),
            "url" => Ok(Self::Url),
            "hash" | "file_hash" | "md5" | "sha1" | "sha256" => Ok(Self::FileHash),
            "email" => Ok(Self::Email),
            "host" | "hostname" => Ok(Self::Hostname),
            "user" | "username" => Ok(Self::User),
            "cve" => Ok(Self::Cve),
            _ => Err(FerretError::UnknownValue {
                kind: "entity kind",
                value: s.to_string(),
            }),
        }
    }
}

/// A typed value found in text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub kind: EntityKind,
    pub value: String,
    /// Hash algorithm for file hashes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

pub struct IndicatorExtractor {
    url: Regex,
    email: Regex,
    cve: Regex,
    hash: Regex,
    ipv4: Regex,
    domain: Regex,
}

impl IndicatorExtractor {
    pub fn new() -> Self {
        let compile = |p: &str| {
            Regex::new(p).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", p, e))
        };
        Self {
            url: compile(r#"https?://[^\s<>"'{}|\\^`\[\]]+[^\s<>"'{}|\\^`\[\].,;!?)]"#),
            email: compile(r"\b[A-Za-z0-9._%+\-]+@(?:[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}\b"),
            cve: compile(r"(?i)\bCVE-\d{4}-\d{4,}\b"),
            hash: compile(r"\b(?:[A-Fa-f0-9]{64}|[A-Fa-f0-9]{40}|[A-Fa-f0-9]{32})\b"),
            ipv4: compile(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b"),
            domain: compile(r"\b(?:[A-Za-z0-9](?:[A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}\b"),
        }
    }

    pub fn shared() -> &'static IndicatorExtractor {
        static SHARED: OnceLock<IndicatorExtractor> = OnceLock::new();
        SHARED.get_or_init(IndicatorExtractor::new)
    }

    /// Indicators in order of appearance, de-duplicated by `(kind, value)`
    ///
    /// Overlapping matches resolve to the more specific kind: a domain inside a
    /// URL or an email address is not reported separately.
    pub fn extract(&self, text: &str) -> Vec<Indicator> {
        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut found: Vec<(usize, Indicator)> = Vec::new();

        let passes: [(&Regex, EntityKind); 6] = [
            (&self.url, EntityKind::Url),
            (&self.email, EntityKind::Email),
            (&self.cve, EntityKind::Cve),
            (&self.hash, EntityKind::FileHash),
            (&self.ipv4, EntityKind::IpAddress),
            (&self.domain, EntityKind::Domain),
        ];

        for (re, kind) in passes {
            for m in re.find_iter(text) {
                if taken.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                    continue;
                }
                let raw = m.as_str();
                let indicator = match kind {
                    EntityKind::IpAddress if !valid_ipv4(raw) => continue,
                    EntityKind::Cve => Indicator {
                        kind,
                        value: raw.to_uppercase(),
                        algorithm: None,
                    },
                    EntityKind::FileHash => Indicator {
                        kind,
                        value: raw.to_lowercase(),
                        algorithm: hash_algorithm(raw).map(str::to_string),
                    },
                    EntityKind::Domain | EntityKind::Email => Indicator {
                        kind,
                        value: raw.to_lowercase(),
                        algorithm: None,
                    },
                    _ => Indicator {
                        kind,
                        value: raw.to_string(),
                        algorithm: None,
                    },
                };
                taken.push((m.start(), m.end()));
                found.push((m.start(), indicator));
            }
        }

        found.sort_by_key(|(start, _)| *start);
        let mut out: Vec<Indicator> = Vec::new();
        for (_, indicator) in found {
            if !out
                .iter()
                .any(|i| i.kind == indicator.kind && i.value == indicator.value)
            {
                out.push(indicator);
            }
        }
        out
    }
}

impl Default for IndicatorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract indicators with the shared extractor
pub fn extract_indicators(text: &str) -> Vec<Indicator> {
    IndicatorExtractor::shared().extract(text)
}

fn valid_ipv4(value: &str) -> bool {
    value.split('.').count() == 4 && value.split('.').all(|o| o.parse::<u8>().is_ok())
}

fn hash_algorithm(value: &str) -> Option<&'static str> {
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match value.len() {
        32 => Some("md5"),
        40 => Some("sha1"),
        64 => Some("sha256"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(EntityKind::detect("10.0.0.5"), Some(EntityKind::IpAddress));
        assert_eq!(EntityKind::detect("999.1.1.1"), None);
        assert_eq!(EntityKind::detect("evil.example.com"), Some(EntityKind::Domain));
        assert_eq!(
            EntityKind::detect("https://evil.example.com/payload.bin"),
            Some(EntityKind::Url)
        );
        assert_eq!(EntityKind::detect("bob@corp.example"), Some(EntityKind::Email));
        assert_eq!(EntityKind::detect("cve-2024-3094"), Some(EntityKind::Cve));
        assert_eq!(
            EntityKind::detect("d41d8cd98f00b204e9800998ecf8427e"),
            Some(EntityKind::FileHash)
        );
        assert_eq!(EntityKind::detect("jdoe"), None);
    }

    #[test]
    fn test_accepts() {
        assert!(EntityKind::IpAddress.accepts("10.0.0.5"));
        assert!(!EntityKind::IpAddress.accepts("evil.example.com"));
        assert!(EntityKind::Hostname.accepts("WS-0142"));
        assert!(EntityKind::Hostname.accepts("db01.corp.local"));
        assert!(EntityKind::User.accepts("CORP\\jdoe"));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("ip".parse::<EntityKind>().unwrap(), EntityKind::IpAddress);
        assert_eq!("sha256".parse::<EntityKind>().unwrap(), EntityKind::FileHash);
        assert_eq!("file-hash".parse::<EntityKind>().unwrap(), EntityKind::FileHash);
        assert!("registry_key".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_extract_in_order_without_overlap() {
        let text = "Beacon from 10.0.0.5 to https://evil.example.com/a.php, reported by \
                    soc@corp.example; dropper 44d88612fea8a8f36de82e1278abb02f exploits CVE-2021-44228. \
                    Also seen: 10.0.0.5 and Evil.Example.com";
        let found = extract_indicators(text);
        let kinds: Vec<(EntityKind, &str)> =
            found.iter().map(|i| (i.kind, i.value.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (EntityKind::IpAddress, "10.0.0.5"),
                (EntityKind::Url, "https://evil.example.com/a.php"),
                (EntityKind::Email, "soc@corp.example"),
                (EntityKind::FileHash, "44d88612fea8a8f36de82e1278abb02f"),
                (EntityKind::Cve, "CVE-2021-44228"),
                (EntityKind::Domain, "evil.example.com"),
            ]
        );
        assert_eq!(found[3].algorithm.as_deref(), Some("md5"));
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract_indicators("no indicators here").is_empty());
    }
}
