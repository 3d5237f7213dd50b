//! SQLite implementation of [`ContentStore`].
//!
//! The durable blob store behind the proxy binary. Uses rusqlite with bundled
//! SQLite, wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use pregrant_core::{now_millis, ContentId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::ContentStore;

/// SQLite-backed content store.
///
/// Thread-safe via internal Mutex.
#[derive(Clone)]
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open a database at the given path, running migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection off the runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(StoreError::poisoned)?;
            f(&conn)
        })
        .await
        .map_err(StoreError::join)?
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = ContentId::for_bytes(&bytes);
        let key = id.clone();

        let inserted = self
            .with_conn(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO blobs (content_id, bytes, size, stored_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![key.as_str(), bytes.as_ref(), bytes.len() as i64, now_millis()],
                )?;
                Ok(n > 0)
            })
            .await?;

        debug!(content_id = %id, inserted, "blob stored");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        let key = id.clone();
        let found: Option<Vec<u8>> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT bytes FROM blobs WHERE content_id = ?1",
                        params![key.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        found
            .map(Bytes::from)
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let store = SqliteContentStore::open_memory().unwrap();
        let id = store.put(Bytes::from_static(b"ciphertext")).await.unwrap();
        assert_eq!(id, ContentId::for_bytes(b"ciphertext"));
        assert_eq!(store.get(&id).await.unwrap(), Bytes::from_static(b"ciphertext"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = SqliteContentStore::open_memory().unwrap();
        let a = store.put(Bytes::from_static(b"same")).await.unwrap();
        let b = store.put(Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_missing_blob_not_found() {
        let store = SqliteContentStore::open_memory().unwrap();
        assert!(matches!(
            store.get(&"b3-missing".into()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.db");

        let id = {
            let store = SqliteContentStore::open(&path).unwrap();
            store.put(Bytes::from_static(b"durable")).await.unwrap()
        };

        let reopened = SqliteContentStore::open(&path).unwrap();
        assert_eq!(reopened.get(&id).await.unwrap(), Bytes::from_static(b"durable"));
    }
}
