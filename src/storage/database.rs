//! SQLite database management with migrations
//!
//! Holds the record tables that back the SQLite source executors

use crate::error::{FerretError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) a database file and bring its schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FerretError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA busy_timeout = 5000;
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| FerretError::Pool(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate()?;
        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| FerretError::Pool(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;
            if version > current_version {
                tracing::info!(version, "Applying migration");
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Schema version currently applied
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.get_conn()?;
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

/// Database migrations (each string is one migration)
pub(crate) const MIGRATIONS: &[&str] = &[
    // Migration 1: records and their embeddings
    r#"
    CREATE TABLE records (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        organization_id TEXT NOT NULL,
        title TEXT,
        name TEXT,
        description TEXT NOT NULL DEFAULT '',
        severity INTEGER,
        status TEXT,
        created_at INTEGER,
        event_time INTEGER,
        first_seen INTEGER,
        attributes TEXT NOT NULL DEFAULT 'null',
        PRIMARY KEY (kind, id)
    );

    CREATE INDEX idx_records_org_kind ON records(organization_id, kind);
    CREATE INDEX idx_records_severity ON records(severity);
    CREATE INDEX idx_records_status ON records(status);

    CREATE TABLE embeddings (
        kind TEXT NOT NULL,
        record_id TEXT NOT NULL,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (kind, record_id),
        FOREIGN KEY (kind, record_id) REFERENCES records(kind, id) ON DELETE CASCADE
    );

    CREATE INDEX idx_embeddings_model ON embeddings(model);
    "#,
    // Migration 2: timestamps move from Unix seconds to Unix milliseconds
    r#"
    UPDATE records SET
        created_at = created_at * 1000,
        event_time = event_time * 1000,
        first_seen = first_seen * 1000;
    UPDATE embeddings SET created_at = created_at * 1000;
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _db = Database::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).unwrap();
        assert_eq!(db.schema_version().unwrap(), MIGRATIONS.len() as i32);
        drop(db);

        let db = Database::new(&db_path).unwrap();
        assert_eq!(db.schema_version().unwrap(), MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_second_timestamps_upgraded_to_millis() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("v1.db");
        {
            let conn = rusqlite::Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
                 INSERT INTO _migrations VALUES (1, datetime('now'));",
            )
            .unwrap();
            conn.execute_batch(MIGRATIONS[0]).unwrap();
            conn.execute(
                "INSERT INTO records (kind, id, organization_id, created_at, first_seen)
                 VALUES ('alert', 'a-1', 'org', 1714564800, NULL)",
                [],
            )
            .unwrap();
        }

        let db = Database::new(&db_path).unwrap();
        assert_eq!(db.schema_version().unwrap(), MIGRATIONS.len() as i32);
        let conn = db.get_conn().unwrap();
        let (created, seen): (i64, Option<i64>) = conn
            .query_row(
                "SELECT created_at, first_seen FROM records WHERE id = 'a-1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(created, 1_714_564_800_000);
        assert_eq!(seen, None);
    }

    #[test]
    fn test_schema_exists() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        for table in ["records", "embeddings"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.get_conn().unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }
}
