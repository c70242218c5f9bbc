//! Embedded SQLite storage provider.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use stash_core::{Error, Result, StorageProvider};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    path       TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// All files in one table keyed by path.
pub struct SqliteProvider {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProvider {
    /// Open (or create) a database file. `:memory:` gives a private in-memory db.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| Error::storage("open", path, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::storage("migrate", path, e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run a blocking statement on the shared connection off the async runtime.
    async fn with_conn<T, F>(&self, operation: &'static str, path: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let owned_path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Internal("sqlite connection lock poisoned".into()))?;
            f(&conn).map_err(|e| Error::storage(operation, owned_path, e))
        })
        .await
        .map_err(|e| Error::Internal(format!("sqlite task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageProvider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let (key, data) = (path.to_string(), bytes.to_vec());
        self.with_conn("save", path, move |conn| {
            conn.execute(
                "INSERT INTO files (path, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![key, data, chrono::Utc::now().to_rfc3339()],
            )
            .map(|_| ())
        })
        .await
    }

    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let (key, data) = (path.to_string(), bytes.to_vec());
        self.with_conn("create", path, move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO files (path, data, updated_at) VALUES (?1, ?2, ?3)",
                params![key, data, chrono::Utc::now().to_rfc3339()],
            )
            .map(|changed| changed == 1)
        })
        .await
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let key = path.to_string();
        self.with_conn("read", path, move |conn| {
            conn.query_row("SELECT data FROM files WHERE path = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
        })
        .await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = path.to_string();
        self.with_conn("exists", path, move |conn| {
            conn.query_row("SELECT COUNT(*) FROM files WHERE path = ?1", [key], |row| {
                row.get::<_, i64>(0)
            })
            .map(|count| count > 0)
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let key = path.to_string();
        self.with_conn("delete", path, move |conn| {
            conn.execute("DELETE FROM files WHERE path = ?1", [key])
                .map(|changed| changed > 0)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let key = prefix.to_string();
        self.with_conn("list", prefix, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path FROM files WHERE substr(path, 1, length(?1)) = ?1 ORDER BY path",
            )?;
            let rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let provider = SqliteProvider::in_memory().unwrap();
        provider.save("ns/a", b"one").await.unwrap();
        provider.save("ns/a", b"two").await.unwrap();
        assert_eq!(provider.read("ns/a").await.unwrap(), Some(b"two".to_vec()));
        assert!(provider.exists("ns/a").await.unwrap());
        assert!(provider.delete("ns/a").await.unwrap());
        assert!(!provider.delete("ns/a").await.unwrap());
        assert_eq!(provider.read("ns/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_insert() {
        let provider = SqliteProvider::in_memory().unwrap();
        assert!(provider.save_if_absent("v1", b"a").await.unwrap());
        assert!(!provider.save_if_absent("v1", b"b").await.unwrap());
        assert_eq!(provider.read("v1").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_list_treats_wildcards_literally() {
        let provider = SqliteProvider::in_memory().unwrap();
        for path in ["ns_1/a", "ns1/a", "ns%/a"] {
            provider.save(path, b"").await.unwrap();
        }
        assert_eq!(provider.list("ns_").await.unwrap(), vec!["ns_1/a"]);
        assert_eq!(provider.list("ns%").await.unwrap(), vec!["ns%/a"]);
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("stash.db");
        let db = db.to_str().unwrap();
        SqliteProvider::open(db).unwrap().save("ns/a", b"kept").await.unwrap();
        let reopened = SqliteProvider::open(db).unwrap();
        assert_eq!(reopened.read("ns/a").await.unwrap(), Some(b"kept".to_vec()));
    }
}
