//! In-memory source executor
//!
//! Holds records and their embeddings in process. Used for tests, demos and as
//! a cache-warm front for small reference sets such as playbooks.

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::sources::{Record, SourceExecutor, SourceKind, SourceRequest};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemorySource {
    kind: SourceKind,
    embedder: Arc<dyn EmbeddingProvider>,
    records: RwLock<Vec<(Record, Option<Vec<f32>>)>>,
}

impl MemorySource {
    pub fn new(kind: SourceKind, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            kind,
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Build a source from records, embedding each; records of another kind are skipped
    pub fn from_records(
        kind: SourceKind,
        embedder: Arc<dyn EmbeddingProvider>,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for record in records.into_iter().filter(|r| r.kind == kind) {
            let vector = embedder.embed(&record.embedding_text()).ok();
            entries.push((record, vector));
        }
        Ok(Self {
            kind,
            embedder,
            records: RwLock::new(entries),
        })
    }

    /// Add or replace a record
    pub async fn insert(&self, record: Record) -> Result<()> {
        let vector = Some(self.embedder.embed(&record.embedding_text())?);
        let mut records = self.records.write().await;
        records.retain(|(r, _)| !(r.id == record.id && r.organization_id == record.organization_id));
        records.push((record, vector));
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SourceExecutor for MemorySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn lookup(&self, request: &SourceRequest) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        let mut found = Vec::new();
        for id in &request.identifiers {
            if let Some((record, _)) = records.iter().find(|(r, _)| {
                r.organization_id == request.organization_id && r.id.eq_ignore_ascii_case(id)
            }) {
                if !found.iter().any(|f: &Record| f.id == record.id) {
                    found.push(record.clone());
                }
            }
        }
        Ok(found)
    }

    async fn filter(&self, request: &SourceRequest) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        let mut matched: Vec<Record> = records
            .iter()
            .filter(|(r, _)| r.organization_id == request.organization_id)
            .filter(|(r, _)| request.criteria.matches(r))
            .map(|(r, _)| r.clone())
            .collect();
        matched.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn similar(&self, request: &SourceRequest) -> Result<Vec<(Record, f32)>> {
        let query = embed_query(&self.embedder, &request.text).await?;
        let records = self.records.read().await;

        let mut scored: Vec<(Record, f32)> = records
            .iter()
            .filter(|(r, _)| r.organization_id == request.organization_id)
            .filter_map(|(r, v)| v.as_ref().map(|v| (r, cosine_similarity(&query, v))))
            .filter(|(_, score)| *score >= request.similarity_threshold)
            .map(|(r, score)| (r.clone(), score.clamp(0.0, 1.0)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::sources::{FilterCriteria, SearchMode};

    fn source() -> MemorySource {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(128).unwrap());
        MemorySource::from_records(
            SourceKind::Incident,
            embedder,
            vec![
                Record::new(SourceKind::Incident, "INC-1", "org")
                    .with_title("Ransomware outbreak on file servers")
                    .with_severity(5)
                    .with_status("open"),
                Record::new(SourceKind::Incident, "INC-2", "org")
                    .with_title("Phishing campaign targeting finance")
                    .with_severity(3)
                    .with_status("closed"),
                Record::new(SourceKind::Incident, "INC-3", "other-org")
                    .with_title("Ransomware outbreak on file servers")
                    .with_severity(5),
                Record::new(SourceKind::Alert, "ALR-1", "org").with_title("wrong kind"),
            ],
        )
        .unwrap()
    }

    fn request(text: &str) -> SourceRequest {
        SourceRequest {
            text: text.to_string(),
            organization_id: "org".to_string(),
            max_results: 10,
            similarity_threshold: 0.1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_records_skips_other_kinds() {
        assert_eq!(source().len().await, 3);
    }

    #[tokio::test]
    async fn test_lookup_case_insensitive() {
        let mut req = request("");
        req.identifiers = vec!["inc-1".into(), "INC-3".into()];
        let found = source().lookup(&req).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "INC-1");
    }

    #[tokio::test]
    async fn test_filter_by_status() {
        let mut req = request("");
        req.criteria = FilterCriteria {
            status: Some("closed".into()),
            ..Default::default()
        };
        let outcome = source().execute(SearchMode::FilterQuery, &req).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].source_id, "INC-2");
    }

    #[tokio::test]
    async fn test_similarity_ranks_related_first() {
        let outcome = source()
            .execute(
                SearchMode::SimilaritySearch,
                &request("ransomware outbreak on servers"),
            )
            .await;
        assert!(!outcome.results.is_empty());
        assert_eq!(outcome.results[0].source_id, "INC-1");
        assert!(outcome
            .results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.native_score)));
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let src = source();
        src.insert(
            Record::new(SourceKind::Incident, "INC-2", "org")
                .with_title("Phishing campaign")
                .with_status("open"),
        )
        .await
        .unwrap();
        assert_eq!(src.len().await, 3);
    }

    #[tokio::test]
    async fn test_similarity_with_empty_query_reports_error() {
        let outcome = source()
            .execute(SearchMode::SimilaritySearch, &request("  "))
            .await;
        assert!(outcome.results.is_empty());
        assert!(outcome.error.is_some());
    }
}
