//! Source executor backed by the SQLite [`RecordStore`]
//!
//! Store calls and query embedding are synchronous and run on the blocking
//! pool. A blocking call that outlives its step timeout finishes in the
//! background; its result is discarded.

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{FerretError, Result};
use crate::sources::{Record, SourceExecutor, SourceKind, SourceRequest};
use crate::storage::RecordStore;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

pub struct SqliteSource {
    kind: SourceKind,
    store: Arc<RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteSource {
    pub fn new(kind: SourceKind, store: Arc<RecordStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            kind,
            store,
            embedder,
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| FerretError::source(self.kind, format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl SourceExecutor for SqliteSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn lookup(&self, request: &SourceRequest) -> Result<Vec<Record>> {
        let kind = self.kind;
        let org = request.organization_id.clone();
        let ids = request.identifiers.clone();
        self.blocking(move |store| store.get(kind, &org, &ids)).await
    }

    async fn filter(&self, request: &SourceRequest) -> Result<Vec<Record>> {
        let kind = self.kind;
        let org = request.organization_id.clone();
        let criteria = request.criteria.clone();
        let limit = request.max_results;
        self.blocking(move |store| store.filter(kind, &org, &criteria, limit))
            .await
    }

    async fn similar(&self, request: &SourceRequest) -> Result<Vec<(Record, f32)>> {
        let embedder = Arc::clone(&self.embedder);
        let text = request.text.clone();
        let kind = self.kind;
        let org = request.organization_id.clone();
        let threshold = request.similarity_threshold;

        self.blocking(move |store| {
            let query = embedder.embed(&text)?;
            let mut scored: Vec<(Record, f32)> = store
                .embedded_records(kind, &org)?
                .into_iter()
                .map(|(record, vector)| {
                    let score = cosine_similarity(&query, &vector);
                    (record, score)
                })
                .filter(|(_, score)| *score >= threshold)
                .map(|(record, score)| (record, score.clamp(0.0, 1.0)))
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            Ok(scored)
        })
        .await
    }
}
