//! Persistent record store used by the SQLite source executors

use crate::embedding::EmbeddingProvider;
use crate::error::{FerretError, Result};
use crate::sources::{FilterCriteria, Record, SourceKind};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const RECORD_COLUMNS: &str = "kind, id, organization_id, title, name, description, severity, \
     status, created_at, event_time, first_seen, attributes";

/// Record persistence on top of [`Database`]
pub struct RecordStore {
    db: Database,
}

/// Counts reported by `ferret stats`
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub records_per_kind: BTreeMap<SourceKind, usize>,
    pub total_records: usize,
    pub embeddings: usize,
    pub organizations: usize,
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub records: usize,
    pub embedded: usize,
    pub embedding_failures: usize,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::new(path)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert or replace one record
    pub fn upsert_record(&self, record: &Record) -> Result<()> {
        let conn = self.db.get_conn()?;
        insert_record(&conn, record)
    }

    /// Store the embedding vector of a record (little-endian f32 blob)
    pub fn upsert_embedding(
        &self,
        kind: SourceKind,
        record_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let conn = self.db.get_conn()?;
        insert_embedding(&conn, kind, record_id, vector, model)
    }

    /// Import records in one transaction, embedding each when a provider is given
    pub fn import(
        &self,
        records: &[Record],
        embedder: Option<&dyn EmbeddingProvider>,
    ) -> Result<ImportSummary> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();

        for record in records {
            insert_record(&tx, record)?;
            summary.records += 1;

            if let Some(provider) = embedder {
                match provider.embed(&record.embedding_text()) {
                    Ok(vector) => {
                        insert_embedding(&tx, record.kind, &record.id, &vector, provider.model_name())?;
                        summary.embedded += 1;
                    }
                    Err(e) => {
                        tracing::warn!(kind = %record.kind, id = %record.id, error = %e, "Skipping embedding");
                        summary.embedding_failures += 1;
                    }
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            records = summary.records,
            embedded = summary.embedded,
            "Imported records"
        );
        Ok(summary)
    }

    /// Records of one kind and organization with any of the given ids (case-insensitive)
    pub fn get(&self, kind: SourceKind, organization_id: &str, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE kind = ?1 AND organization_id = ?2 AND lower(id) = lower(?3)",
            RECORD_COLUMNS
        ))?;

        let mut records = Vec::new();
        for id in ids {
            let mut rows = stmt.query(params![kind.as_str(), organization_id, id])?;
            while let Some(row) = rows.next()? {
                let record = record_from_row(row)?;
                if !records.iter().any(|r: &Record| r.id == record.id) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Records matching the criteria, newest first, at most `limit`
    ///
    /// Severity, time window and status are pushed down to SQL; substring and
    /// term matching run on the loaded records.
    pub fn filter(
        &self,
        kind: SourceKind,
        organization_id: &str,
        criteria: &FilterCriteria,
        limit: usize,
    ) -> Result<Vec<Record>> {
        if !criteria.is_constrained() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {} FROM records WHERE kind = ?1 AND organization_id = ?2",
            RECORD_COLUMNS
        );
        let mut values: Vec<Value> = vec![
            Value::Text(kind.as_str().to_string()),
            Value::Text(organization_id.to_string()),
        ];

        if let Some(min) = criteria.min_severity {
            values.push(Value::Integer(min as i64));
            sql.push_str(&format!(" AND severity >= ?{}", values.len()));
        }
        if let Some(since) = criteria.since {
            values.push(Value::Integer(since.timestamp_millis()));
            sql.push_str(&format!(
                " AND COALESCE(created_at, event_time, first_seen) >= ?{}",
                values.len()
            ));
        }
        if let Some(status) = &criteria.status {
            values.push(Value::Text(status.to_lowercase()));
            sql.push_str(&format!(" AND lower(status) = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY COALESCE(created_at, event_time, first_seen) DESC, id ASC");

        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let record = record_from_row(row)?;
            if criteria.matches(&record) {
                records.push(record);
                if records.len() >= limit {
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Every record of one kind and organization that has a stored embedding
    pub fn embedded_records(
        &self,
        kind: SourceKind,
        organization_id: &str,
    ) -> Result<Vec<(Record, Vec<f32>)>> {
        let conn = self.db.get_conn()?;
        let columns: Vec<String> = RECORD_COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c.trim()))
            .collect();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, e.vector FROM records r
             JOIN embeddings e ON e.kind = r.kind AND e.record_id = r.id
             WHERE r.kind = ?1 AND r.organization_id = ?2
             ORDER BY r.id",
            columns.join(", ")
        ))?;

        let mut rows = stmt.query(params![kind.as_str(), organization_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let record = record_from_row(row)?;
            let blob: Vec<u8> = row.get(12)?;
            out.push((record, vector_from_blob(&blob)));
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.db.get_conn()?;
        let mut stats = StoreStats::default();

        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM records GROUP BY kind")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let kind: SourceKind = kind.parse()?;
            stats.records_per_kind.insert(kind, count as usize);
            stats.total_records += count as usize;
        }

        let embeddings: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        let organizations: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT organization_id) FROM records",
            [],
            |row| row.get(0),
        )?;
        stats.embeddings = embeddings as usize;
        stats.organizations = organizations as usize;
        Ok(stats)
    }
}

fn insert_record(conn: &rusqlite::Connection, record: &Record) -> Result<()> {
    let attributes = serde_json::to_string(&record.attributes).map_err(|e| FerretError::Json {
        source: e,
        context: format!("Failed to serialize attributes of {}", record.id),
    })?;

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            RECORD_COLUMNS
        ),
        params![
            record.kind.as_str(),
            record.id,
            record.organization_id,
            record.title,
            record.name,
            record.description,
            record.severity.map(|s| s as i64),
            record.status,
            record.created_at.map(|t| t.timestamp_millis()),
            record.event_time.map(|t| t.timestamp_millis()),
            record.first_seen.map(|t| t.timestamp_millis()),
            attributes,
        ],
    )?;
    Ok(())
}

fn insert_embedding(
    conn: &rusqlite::Connection,
    kind: SourceKind,
    record_id: &str,
    vector: &[f32],
    model: &str,
) -> Result<()> {
    let blob: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
    conn.execute(
        "INSERT OR REPLACE INTO embeddings (kind, record_id, vector, model, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![kind.as_str(), record_id, blob, model, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

fn vector_from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Timestamps are stored as Unix milliseconds
fn timestamp(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

fn record_from_row(row: &Row<'_>) -> Result<Record> {
    let kind: String = row.get(0)?;
    let attributes: String = row.get(11)?;
    let severity: Option<i64> = row.get(6)?;

    Ok(Record {
        kind: kind.parse()?,
        id: row.get(1)?,
        organization_id: row.get(2)?,
        title: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        severity: severity.map(|s| s.clamp(0, u8::MAX as i64) as u8),
        status: row.get(7)?,
        created_at: timestamp(row.get(8)?),
        event_time: timestamp(row.get(9)?),
        first_seen: timestamp(row.get(10)?),
        attributes: serde_json::from_str(&attributes).map_err(|e| FerretError::Json {
            source: e,
            context: "Failed to parse stored attributes".to_string(),
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(&dir.path().join("records.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_record_roundtrip_preserves_fields() {
        let (_dir, store) = store();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = Record::new(SourceKind::Alert, "A-1", "org")
            .with_title("Beacon")
            .with_severity(4)
            .with_status("open")
            .with_created_at(ts)
            .with_attributes(serde_json::json!({"src_ip": "10.0.0.5"}));
        store.upsert_record(&record).unwrap();

        let loaded = store
            .get(SourceKind::Alert, "org", &["a-1".to_string()])
            .unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_sub_second_timestamps_survive() {
        let (_dir, store) = store();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds(437);
        let record = Record::new(SourceKind::Incident, "inc-1", "org")
            .with_event_time(ts)
            .with_first_seen(ts - Duration::milliseconds(999));
        store.upsert_record(&record).unwrap();

        let loaded = store
            .get(SourceKind::Incident, "org", &["inc-1".to_string()])
            .unwrap();
        assert_eq!(loaded[0].event_time, Some(ts));
        assert_eq!(loaded[0].first_seen, Some(ts - Duration::milliseconds(999)));

        let since = |offset_ms| FilterCriteria {
            since: Some(ts + Duration::milliseconds(offset_ms)),
            ..Default::default()
        };
        assert_eq!(store.filter(SourceKind::Incident, "org", &since(-10), 10).unwrap().len(), 1);
        // window opens later within the same second
        assert!(store.filter(SourceKind::Incident, "org", &since(10), 10).unwrap().is_empty());
    }

    #[test]
    fn test_get_is_scoped() {
        let (_dir, store) = store();
        store
            .upsert_record(&Record::new(SourceKind::Alert, "a", "org-1"))
            .unwrap();
        assert!(store
            .get(SourceKind::Alert, "org-2", &["a".to_string()])
            .unwrap()
            .is_empty());
        assert!(store
            .get(SourceKind::Incident, "org-1", &["a".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_filter_pushdown_and_order() {
        let (_dir, store) = store();
        let now = Utc::now();
        for (id, sev, hours) in [("old", 5, 72), ("new", 5, 1), ("mid", 5, 5), ("low", 2, 1)] {
            store
                .upsert_record(
                    &Record::new(SourceKind::Alert, id, "org")
                        .with_title("Credential dumping")
                        .with_severity(sev)
                        .with_created_at(now - Duration::hours(hours)),
                )
                .unwrap();
        }

        let criteria = FilterCriteria {
            min_severity: Some(5),
            since: Some(now - Duration::hours(24)),
            ..Default::default()
        };
        let ids: Vec<String> = store
            .filter(SourceKind::Alert, "org", &criteria, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid"]);

        let limited = store.filter(SourceKind::Alert, "org", &criteria, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_unconstrained_filter_returns_nothing() {
        let (_dir, store) = store();
        store
            .upsert_record(&Record::new(SourceKind::Asset, "h", "org"))
            .unwrap();
        assert!(store
            .filter(SourceKind::Asset, "org", &FilterCriteria::default(), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_import_with_embeddings_and_stats() {
        let (_dir, store) = store();
        let embedder = HashingEmbedder::new(32).unwrap();
        let records = vec![
            Record::new(SourceKind::Playbook, "p1", "org").with_title("Ransomware response"),
            Record::new(SourceKind::Asset, "h1", "org-2").with_name("db-01"),
        ];
        let summary = store.import(&records, Some(&embedder)).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.embedded, 2);

        let embedded = store.embedded_records(SourceKind::Playbook, "org").unwrap();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].1.len(), 32);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.embeddings, 2);
        assert_eq!(stats.organizations, 2);
        assert_eq!(stats.records_per_kind.get(&SourceKind::Asset), Some(&1));
    }
}
