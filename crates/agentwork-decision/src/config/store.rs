//! [`ConfigStore`] implementations.
//!
//! - [`SqliteConfigStore`] reads a `system_configuration(key, value)` table.
//!   The `rusqlite::Connection` lives behind an `Arc<Mutex<>>` and every query
//!   runs on the blocking pool via `tokio::task::spawn_blocking`.
//! - [`MemoryConfigStore`] keeps values in a map; used by tests and by the
//!   CLI when seeded from a TOML file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use super::ConfigStore;
use crate::error::{DecisionError, Result};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS system_configuration (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)";

// ── sqlite ───────────────────────────────────────────────────────────

/// Configuration store backed by a SQLite table.
#[derive(Clone)]
pub struct SqliteConfigStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConfigStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    ///
    /// Blocks briefly on file I/O; call during startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening config database");

        let conn = Connection::open(path).map_err(|e| DecisionError::StoreUnavailable {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::prepare(conn)
    }

    /// Create an in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory config database");
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a value.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO system_configuration (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    /// Remove a value, returning whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();
        self.execute(move |conn| {
            let removed = conn.execute(
                "DELETE FROM system_configuration WHERE key = ?1",
                params![key],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| DecisionError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.execute(move |conn| {
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = format!(
                "SELECT key, value FROM system_configuration WHERE key IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut values = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                values.insert(key, value);
            }
            Ok(values)
        })
        .await
    }
}

// ── memory ───────────────────────────────────────────────────────────

/// Map-backed configuration store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `values`.
    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let values = self
            .values
            .read()
            .map_err(|e| DecisionError::StoreUnavailable {
                reason: format!("lock poisoned: {e}"),
            })?;
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }
}

// ── tests ────────────────────────────────────────────────────────────
