use ferret::classifier::classify;
use ferret::config::Config;
use ferret::engine::SearchEngine;
use ferret::sources::SourceRegistry;
use ferret::tools::{ToolDescriptor, ToolRelevanceScorer};

fn catalog() -> Vec<ToolDescriptor> {
    [
        "get_alert_by_id",
        "search_alerts",
        "get_latest_critical_alerts",
        "generate_incident_report",
        "hybrid_search",
        "list_assets",
        "isolateHost",
    ]
    .into_iter()
    .map(ToolDescriptor::new)
    .collect()
}

fn score_of(scores: &[ferret::ToolScore], name: &str) -> f32 {
    scores
        .iter()
        .find(|s| s.tool_name == name)
        .map(|s| s.score)
        .unwrap_or_else(|| panic!("no score for {}", name))
}

#[test]
fn test_scores_stay_in_unit_range_and_order() {
    let tools = catalog();
    for text in [
        "show critical alerts from the last 24 hours",
        "a1b2c3d4-e5f6-7890-abcd-ef1234567890",
        "analyze the phishing campaign",
        "hello",
    ] {
        let scores = ToolRelevanceScorer::default().score(&classify(text), &tools);
        assert_eq!(scores.len(), tools.len());
        for (score, tool) in scores.iter().zip(&tools) {
            assert_eq!(score.tool_name, tool.name);
            assert!((0.0..=1.0).contains(&score.score));
            assert_eq!(score.recommended, score.score >= 0.6);
            assert!(!score.reasons.is_empty());
        }
    }
}

#[test]
fn test_identifier_query_prefers_lookup_tools() {
    let c = classify("details for a1b2c3d4-e5f6-7890-abcd-ef1234567890");
    let scores = ToolRelevanceScorer::default().score(&c, &catalog());

    // 0.1 + 0.8 for the lookup signal
    assert_eq!(score_of(&scores, "get_alert_by_id"), 0.9);
    // broad scope penalty floors at zero
    assert_eq!(score_of(&scores, "hybrid_search"), 0.0);
    assert_eq!(score_of(&scores, "isolateHost"), 0.1);
}

#[test]
fn test_structured_filter_query() {
    let c = classify("show critical alerts from the last 24 hours");
    let scores = ToolRelevanceScorer::default().score(&c, &catalog());

    assert_eq!(score_of(&scores, "get_latest_critical_alerts"), 1.0);
    // 0.1 + 0.6 get/search + 0.5 alert, clipped
    assert_eq!(score_of(&scores, "search_alerts"), 1.0);
    // 0.1 + 0.6 get/search - 0.2 broad
    assert_eq!(score_of(&scores, "hybrid_search"), 0.5);
    assert_eq!(score_of(&scores, "generate_incident_report"), 0.1);
}

#[test]
fn test_recommendations_through_engine() {
    let engine = SearchEngine::new(SourceRegistry::new(), &Config::default()).unwrap();
    let c = engine.classify("analyze the phishing campaign");
    let picked = engine.recommend_tools(&c, &catalog());

    let names: Vec<&str> = picked.iter().map(|s| s.tool_name.as_str()).collect();
    assert_eq!(names, vec!["generate_incident_report"]);
    assert_eq!(picked[0].score, 0.8);
}

#[test]
fn test_scoring_is_pure() {
    let c = classify("find alerts on host web-01");
    let tools = catalog();
    let scorer = ToolRelevanceScorer::default();
    assert_eq!(scorer.score(&c, &tools), scorer.score(&c, &tools));
}
