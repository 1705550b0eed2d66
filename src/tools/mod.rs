//! Tool relevance scoring
//!
//! Scores candidate automation actions against a classified query. Scoring is a
//! pure function of the classification and the tool names.

use crate::classifier::{Classification, EntityTag, QueryType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolScore {
    pub tool_name: String,
    pub score: f32,
    pub reasons: Vec<String>,
    pub recommended: bool,
}

/// Capability a tool name signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    SpecificLookup,
    GetOrSearch,
    AnalyzeOrGenerate,
    AlertNamed,
    CriticalNamed,
    LatestNamed,
    BroadScope,
}

impl Signal {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::SpecificLookup => &["id", "lookup", "detail", "details", "by"],
            Self::GetOrSearch => &["get", "search", "list", "find", "query", "fetch"],
            Self::AnalyzeOrGenerate => &[
                "analyze", "analyse", "analysis", "generate", "summarize", "correlate",
                "investigate", "report",
            ],
            Self::AlertNamed => &["alert", "alerts"],
            Self::CriticalNamed => &["critical"],
            Self::LatestNamed => &["latest", "recent"],
            Self::BroadScope => &["hybrid", "all", "broad", "global", "universal"],
        }
    }

    fn fires(&self, tokens: &[String]) -> bool {
        let keywords = self.keywords();
        tokens.iter().any(|t| keywords.contains(&t.as_str()))
    }
}

/// Split a tool name into lowercase tokens on separators and camelCase humps
fn tokenize(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone)]
pub struct ToolRelevanceScorer {
    recommend_threshold: f32,
}

impl Default for ToolRelevanceScorer {
    fn default() -> Self {
        Self {
            recommend_threshold: 0.6,
        }
    }
}

impl ToolRelevanceScorer {
    pub fn new(recommend_threshold: f32) -> Self {
        Self {
            recommend_threshold,
        }
    }

    /// Score every tool, preserving input order
    pub fn score(&self, classification: &Classification, tools: &[ToolDescriptor]) -> Vec<ToolScore> {
        tools
            .iter()
            .map(|tool| self.score_one(classification, tool))
            .collect()
    }

    /// Recommended tools only, best first
    pub fn recommend(&self, classification: &Classification, tools: &[ToolDescriptor]) -> Vec<ToolScore> {
        let mut scores: Vec<ToolScore> = self
            .score(classification, tools)
            .into_iter()
            .filter(|s| s.recommended)
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.tool_name.cmp(&b.tool_name))
        });
        scores
    }

    fn score_one(&self, classification: &Classification, tool: &ToolDescriptor) -> ToolScore {
        let tokens = tokenize(&tool.name);
        let mut reasons = vec!["base relevance".to_string()];
        // tenths of a point
        let mut tenths: i32 = 1;

        match classification.query_type {
            QueryType::SpecificRecord if Signal::SpecificLookup.fires(&tokens) => {
                tenths += 8;
                reasons.push("specific record query matches lookup tool".to_string());
            }
            QueryType::StructuredFilter if Signal::GetOrSearch.fires(&tokens) => {
                tenths += 6;
                reasons.push("structured filter query matches get/search tool".to_string());
            }
            QueryType::Analytical if Signal::AnalyzeOrGenerate.fires(&tokens) => {
                tenths += 7;
                reasons.push("analytical query matches analyze/generate tool".to_string());
            }
            _ => {}
        }

        let tag_bonuses = [
            (EntityTag::AlertRelated, Signal::AlertNamed, 5, "alert terms match alert tool"),
            (EntityTag::SeverityRelated, Signal::CriticalNamed, 3, "severity terms match critical tool"),
            (EntityTag::TimeRelated, Signal::LatestNamed, 3, "time window matches latest tool"),
        ];
        for (tag, signal, bonus, reason) in tag_bonuses {
            if classification.has_tag(tag) && signal.fires(&tokens) {
                tenths += bonus;
                reasons.push(reason.to_string());
            }
        }

        if classification.confidence > 0.8 && Signal::BroadScope.fires(&tokens) {
            tenths -= 2;
            reasons.push("broad tool penalized for a high-certainty query".to_string());
        }

        let score = tenths.clamp(0, 10) as f32 / 10.0;
        ToolScore {
            tool_name: tool.name.clone(),
            score,
            reasons,
            recommended: score >= self.recommend_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    fn tools(names: &[&str]) -> Vec<ToolDescriptor> {
        names.iter().map(|n| ToolDescriptor::new(*n)).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("getAlertById"), vec!["get", "alert", "by", "id"]);
        assert_eq!(tokenize("search_latest-alerts"), vec!["search", "latest", "alerts"]);
        assert_eq!(tokenize("HybridSearch v2"), vec!["hybrid", "search", "v2"]);
    }

    #[test]
    fn test_specific_record_prefers_lookup() {
        let c = classify("details for a1b2c3d4-e5f6-7890-abcd-ef1234567890");
        let scores = ToolRelevanceScorer::default().score(&c, &tools(&["get_record_by_id", "hybrid_search"]));
        assert_eq!(scores[0].score, 0.9);
        assert!(scores[0].recommended);
        // base 0.1, broad penalty clipped at 0
        assert_eq!(scores[1].score, 0.0);
        assert!(!scores[1].recommended);
    }

    #[test]
    fn test_structured_filter_bonuses() {
        let c = classify("show critical alerts from the last 24 hours");
        let scores = ToolRelevanceScorer::default().score(
            &c,
            &tools(&["get_latest_critical_alerts", "search_assets", "generate_report"]),
        );
        // 0.1 + 0.6 + 0.5 + 0.3 + 0.3 clipped
        assert_eq!(scores[0].score, 1.0);
        assert_eq!(scores[1].score, 0.7);
        assert_eq!(scores[2].score, 0.1);
        assert_eq!(scores[0].reasons.len(), 5);
    }

    #[test]
    fn test_analytical() {
        let c = classify("analyze the phishing campaign");
        let scores = ToolRelevanceScorer::default().score(&c, &tools(&["analyze_incident", "list_assets"]));
        assert_eq!(scores[0].score, 0.8);
        assert!(scores[0].recommended);
        assert_eq!(scores[1].score, 0.1);
    }

    #[test]
    fn test_scoring_is_pure() {
        let c = classify("find alerts on host web-01");
        let list = tools(&["search_alerts", "hybrid_search", "get_alert_by_id"]);
        let scorer = ToolRelevanceScorer::default();
        assert_eq!(scorer.score(&c, &list), scorer.score(&c, &list));
    }

    #[test]
    fn test_recommend_sorted() {
        let c = classify("show critical alerts from the last 24 hours");
        let picked = ToolRelevanceScorer::default().recommend(
            &c,
            &tools(&["search_assets", "get_latest_critical_alerts", "generate_report"]),
        );
        let names: Vec<&str> = picked.iter().map(|s| s.tool_name.as_str()).collect();
        assert_eq!(names, vec!["get_latest_critical_alerts", "search_assets"]);
    }
}
