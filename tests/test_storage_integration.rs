use chrono::{Duration, Utc};
use ferret::config::Config;
use ferret::correlation::{CorrelationRequest, EntityKind};
use ferret::embedding::{provider_from_config, EmbeddingProvider};
use ferret::engine::{build_registry, Query, SearchEngine};
use ferret::router::Strategy;
use ferret::sources::{Record, SourceKind};
use ferret::storage::RecordStore;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const ORG: &str = "org-1";
const ALERT_ID: &str = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";

fn sample_records() -> Vec<Record> {
    let now = Utc::now();
    vec![
        Record::new(SourceKind::Alert, ALERT_ID, ORG)
            .with_title("Ransomware encryption activity on FIN-WS-12")
            .with_description("Mass file renames with .locked extension")
            .with_severity(5)
            .with_status("open")
            .with_created_at(now - Duration::hours(3))
            .with_attributes(json!({ "host": "FIN-WS-12", "src_ip": "10.0.0.5" })),
        Record::new(SourceKind::Alert, "b2c3d4e5-f6a7-8901-bcde-f12345678901", ORG)
            .with_title("Brute force against VPN gateway")
            .with_severity(3)
            .with_status("closed")
            .with_created_at(now - Duration::days(3)),
        Record::new(SourceKind::Incident, "inc-100", ORG)
            .with_title("Ransomware outbreak in finance")
            .with_description("Several workstations encrypted; beacon to 10.0.0.5")
            .with_severity(5)
            .with_created_at(now - Duration::hours(2)),
        Record::new(SourceKind::Asset, "asset-12", ORG)
            .with_name("FIN-WS-12")
            .with_description("Finance workstation")
            .with_first_seen(now - Duration::days(200)),
        Record::new(SourceKind::Playbook, "pb-ransomware", ORG)
            .with_title("Ransomware containment")
            .with_description("Isolate host, preserve memory, block command and control"),
        Record::new(SourceKind::Alert, "c3d4e5f6-a7b8-9012-cdef-123456789012", "org-2")
            .with_title("Ransomware encryption activity")
            .with_severity(5)
            .with_created_at(now - Duration::hours(1)),
    ]
}

fn setup() -> (TempDir, Arc<RecordStore>, SearchEngine) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.database_path = dir.path().join("records.sqlite");

    let store = Arc::new(RecordStore::open(&config.storage.database_path).unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = provider_from_config(&config.embedding).unwrap();
    let summary = store
        .import(&sample_records(), Some(embedder.as_ref()))
        .unwrap();
    assert_eq!(summary.records, 6);
    assert_eq!(summary.embedded, 6);

    let engine = SearchEngine::new(build_registry(Arc::clone(&store), embedder), &config).unwrap();
    (dir, store, engine)
}

#[tokio::test]
async fn test_specific_record_lookup() {
    let (_dir, _store, engine) = setup();
    let query = Query::new(format!("what happened in {}", ALERT_ID.to_uppercase()), ORG);
    let response = engine.hybrid_search(&query).await.unwrap();

    assert!(response.success);
    assert_eq!(response.results.strategy, Strategy::SpecificRecord);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results.results[0].source_id, ALERT_ID);
    assert_eq!(response.results.results[0].normalized_score, 1.0);
    assert_eq!(response.results.key_findings.len(), 1);
}

#[tokio::test]
async fn test_structured_filter_over_store() {
    let (_dir, _store, engine) = setup();
    let query = Query::new("show critical alerts from the last 24 hours", ORG)
        .with_sources([SourceKind::Alert, SourceKind::Incident]);
    let response = engine.hybrid_search(&query).await.unwrap();

    let ids: Vec<&str> = response
        .results
        .results
        .iter()
        .map(|r| r.source_id.as_str())
        .collect();
    assert_eq!(ids, vec![ALERT_ID, "inc-100"]);
    assert_eq!(response.results.metadata.per_source_counts[&SourceKind::Alert], 1);
}

#[tokio::test]
async fn test_semantic_search_over_store() {
    let (_dir, _store, engine) = setup();
    let query = Query::new("ransomware containment", ORG)
        .with_similarity_threshold(0.1)
        .with_strategy(Strategy::SemanticSearch);
    let response = engine.hybrid_search(&query).await.unwrap();

    assert!(response.success);
    assert!(!response.results.is_empty());
    assert!(response
        .results
        .results
        .iter()
        .any(|r| r.source_id == "pb-ransomware"));
    assert!(response
        .results
        .results
        .iter()
        .all(|r| r.record.organization_id == ORG));
}

#[tokio::test]
async fn test_correlation_over_store() {
    let (_dir, _store, engine) = setup();
    let request = CorrelationRequest::new(EntityKind::IpAddress, "10.0.0.5", ORG).with_threshold(0.7);
    let report = engine.find_related(&request).await.unwrap();

    let ids: Vec<&str> = report.hits.iter().map(|h| h.source_id.as_str()).collect();
    assert_eq!(ids, vec![ALERT_ID, "inc-100"]);
    assert!(report.per_source_errors.is_empty());
    assert_eq!(report.timeline[0].source_id, ALERT_ID);
}

#[test]
fn test_stats() {
    let (_dir, store, _engine) = setup();
    let stats = store.stats().unwrap();
    assert_eq!(stats.total_records, 6);
    assert_eq!(stats.records_per_kind[&SourceKind::Alert], 3);
    assert_eq!(stats.embeddings, 6);
    assert_eq!(stats.organizations, 2);
}

#[test]
fn test_reimport_replaces_records() {
    let (_dir, store, _engine) = setup();
    let updated = Record::new(SourceKind::Asset, "asset-12", ORG).with_name("FIN-WS-12-renamed");
    store.import(&[updated], None).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_records, 6);
    let got = store
        .get(SourceKind::Asset, ORG, &["asset-12".to_string()])
        .unwrap();
    assert_eq!(got[0].name.as_deref(), Some("FIN-WS-12-renamed"));
}
