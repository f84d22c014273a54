//! Upload record persistence.
//!
//! SQLite is synchronous, so the connection sits behind a mutex and every call
//! runs on the blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};

/// One persisted upload. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub filename: String,
    pub url: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl UploadRecord {
    /// `{url}?token={token}`
    pub fn download_link(&self) -> String {
        format!("{}?token={}", self.url, self.token)
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration: {0}")]
    Migration(#[from] rusqlite_migration::Error),
    #[error("blocking task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record and return its row id.
    async fn insert(&self, record: &UploadRecord) -> Result<i64, PersistenceError>;

    async fn close(&self) {}
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    url TEXT NOT NULL,
    token TEXT NOT NULL,
    created_at TEXT NOT NULL
);",
    )])
}

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database file with WAL enabled and run migrations.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| PersistenceError::Unavailable(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::migrate(conn)?;
        info!("Record store opened at {}", path.display());
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::migrate(Connection::open_in_memory()?)
    }

    fn migrate(mut conn: Connection) -> Result<Self, PersistenceError> {
        migrations().to_latest(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| PersistenceError::Unavailable("connection lock poisoned".into()))?;
            op(&conn)
        })
        .await
        .map_err(|err| PersistenceError::Task(err.to_string()))?
    }
}

#[cfg(test)]
impl SqliteRecordStore {
    /// All records created for `filename`, oldest first.
    pub async fn find_by_filename(
        &self,
        filename: &str,
    ) -> Result<Vec<UploadRecord>, PersistenceError> {
        let filename = filename.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT filename, url, token, created_at FROM uploads WHERE filename = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([filename], |row| {
                Ok(UploadRecord {
                    filename: row.get(0)?,
                    url: row.get(1)?,
                    token: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &UploadRecord) -> Result<i64, PersistenceError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO uploads (filename, url, token, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![record.filename, record.url, record.token, record.created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn close(&self) {
        let result = self
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA optimize;")?;
                Ok(())
            })
            .await;
        if let Err(err) = result {
            warn!(error = %err, "record store close failed");
        }
    }
}

/// Stand-in used when the database cannot be opened at startup. Every write
/// fails, so uploads surface as 500s while the rest of the service keeps working.
pub struct UnavailableRecordStore {
    reason: String,
}

impl UnavailableRecordStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RecordStore for UnavailableRecordStore {
    async fn insert(&self, _record: &UploadRecord) -> Result<i64, PersistenceError> {
        Err(PersistenceError::Unavailable(self.reason.clone()))
    }
}

/// Open the SQLite store, falling back to [`UnavailableRecordStore`] instead
/// of refusing to boot.
pub fn connect(path: &Path) -> Arc<dyn RecordStore> {
    match SqliteRecordStore::open(path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(path = %path.display(), error = %err, "record store connection error");
            Arc::new(UnavailableRecordStore::new(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(filename: &str, token: &str) -> UploadRecord {
        UploadRecord {
            filename: filename.to_string(),
            url: format!("http://localhost:5000/uploads/{filename}"),
            token: token.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn download_link_appends_token_query() {
        let record = record("report.pdf", "00ff");
        assert_eq!(
            record.download_link(),
            "http://localhost:5000/uploads/report.pdf?token=00ff"
        );
    }

    #[tokio::test]
    async fn same_filename_keeps_every_record() {
        let store = SqliteRecordStore::open_in_memory().expect("open");
        let first = store.insert(&record("a.txt", "t1")).await.expect("insert");
        let second = store.insert(&record("a.txt", "t2")).await.expect("insert");
        store.insert(&record("b.txt", "t3")).await.expect("insert");
        assert!(second > first);

        let found = store.find_by_filename("a.txt").await.expect("query");
        let tokens: Vec<_> = found.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, ["t1", "t2"]);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data").join("fileshare.db");
        let original = record("kept.bin", "abc");
        {
            let store = SqliteRecordStore::open(&path).expect("open");
            store.insert(&original).await.expect("insert");
            store.close().await;
        }
        let store = SqliteRecordStore::open(&path).expect("reopen");
        let found = store.find_by_filename("kept.bin").await.expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, original.url);
        assert_eq!(found[0].token, original.token);
    }

    #[tokio::test]
    async fn connect_falls_back_when_database_cannot_open() {
        let temp = tempdir().expect("tempdir");
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").expect("write blocker");
        let store = connect(&blocker.join("fileshare.db"));
        let result = store.insert(&record("x", "y")).await;
        assert!(matches!(result, Err(PersistenceError::Unavailable(_))));
    }
}
