//! Entity-tag detectors
//!
//! Each tag is an independent, case-insensitive, word-bounded keyword detector.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTag {
    AlertRelated,
    SeverityRelated,
    TimeRelated,
    AssetRelated,
    SearchVerb,
    AnalysisVerb,
}

impl EntityTag {
    pub const ALL: [EntityTag; 6] = [
        EntityTag::AlertRelated,
        EntityTag::SeverityRelated,
        EntityTag::TimeRelated,
        EntityTag::AssetRelated,
        EntityTag::SearchVerb,
        EntityTag::AnalysisVerb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertRelated => "alert_related",
            Self::SeverityRelated => "severity_related",
            Self::TimeRelated => "time_related",
            Self::AssetRelated => "asset_related",
            Self::SearchVerb => "search_verb",
            Self::AnalysisVerb => "analysis_verb",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::AlertRelated => {
                r"(?i)\b(?:alert|incident|threat|attack|breach|malware|intrusion|compromise)s?\b"
            }
            Self::SeverityRelated => r"(?i)\b(?:critical|high|medium|low|severity|severe|urgent)\b",
            Self::TimeRelated => {
                r"(?i)\b(?:last|past|recent|recently|today|yesterday|minutes?|hours?|days?|weeks?|months?|since|ago|24h)\b"
            }
            Self::AssetRelated => {
                r"(?i)\b(?:asset|host|server|device|endpoint|machine|workstation|laptop)s?\b"
            }
            Self::SearchVerb => r"(?i)\b(?:search|show|find|list|get|display|lookup)\b",
            Self::AnalysisVerb => {
                r"(?i)\b(?:analy[sz](?:e|es|ed|ing|is)|investigat(?:e|es|ed|ing|ion)|explain(?:s|ed|ing)?|why|correlat(?:e|es|ed|ing|ion)|assess(?:es|ed|ing|ment)?)\b"
            }
        }
    }
}

impl std::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled detectors for every [`EntityTag`]
pub struct TagDetector {
    detectors: Vec<(EntityTag, Regex)>,
}

impl TagDetector {
    pub fn new() -> Self {
        let detectors = EntityTag::ALL
            .iter()
            .map(|tag| (*tag, super::compile(tag.pattern())))
            .collect();
        Self { detectors }
    }

    /// Tags whose detector fired anywhere in the text
    pub fn detect(&self, text: &str) -> BTreeSet<EntityTag> {
        self.detectors
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(tag, _)| *tag)
            .collect()
    }

    /// True if a single word is one of the detector keywords
    pub fn is_keyword(&self, word: &str) -> bool {
        self.detectors.iter().any(|(_, re)| {
            re.find(word)
                .map_or(false, |m| m.start() == 0 && m.end() == word.len())
        })
    }
}

impl Default for TagDetector {
    fn default() -> Self {
        Self::new()
    }
}
