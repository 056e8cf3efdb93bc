// LINGR Engine: State Store
// Key/value persistence for every engine's serializable state, in SQLite
// via rusqlite. Each value is a JSON envelope `{"version", "data"}`; a
// version mismatch reads back as absence so stale layouts are dropped
// instead of mis-decoded.
//
// Failures never reach callers of `save`/`load`: they are logged and the
// in-memory state stays authoritative until the next successful write.
//
// Module layout:
//   schema   : table DDL and migrations
//   debounce : coalescing writer for high-frequency state

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::atoms::constants::STATE_VERSION;
use crate::atoms::error::EngineResult;
use crate::atoms::types::StoreKey;

mod debounce;
mod schema;

pub use debounce::DebouncedWriter;

/// Default database location: `<data dir>/lingr/lingr.db`.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lingr")
        .join("lingr.db")
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: String,
    data: serde_json::Value,
}

/// Thread-safe state store.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> EngineResult<Self> {
        info!("[store] Opening state store at {:?}", path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Writes ──────────────────────────────────────────────────────────

    fn write_raw(&self, key: StoreKey, json: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key.as_str(), json],
        )?;
        Ok(())
    }

    pub(crate) fn save_with_version<T: Serialize>(
        &self,
        key: StoreKey,
        version: &str,
        value: &T,
    ) -> EngineResult<()> {
        let json = serde_json::to_string(&EnvelopeRef {
            version,
            data: value,
        })?;
        self.write_raw(key, &json)
    }

    pub fn try_save<T: Serialize>(&self, key: StoreKey, value: &T) -> EngineResult<()> {
        self.save_with_version(key, STATE_VERSION, value)
    }

    /// Persist `value` under `key`. Returns false (and logs) on failure.
    pub fn save<T: Serialize>(&self, key: StoreKey, value: &T) -> bool {
        match self.try_save(key, value) {
            Ok(()) => {
                debug!("[store] Saved {}", key);
                true
            }
            Err(e) => {
                error!("[store] Failed to save {}: {}", key, e);
                false
            }
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn try_load<T: DeserializeOwned>(&self, key: StoreKey) -> EngineResult<Option<T>> {
        let raw: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT value FROM state WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope: Envelope = serde_json::from_str(&raw)?;
        if envelope.version != STATE_VERSION {
            warn!(
                "[store] Version mismatch for {} (stored {}, expected {}), ignoring",
                key, envelope.version, STATE_VERSION
            );
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(envelope.data)?))
    }

    /// Load the value under `key`. Absence, version mismatch and decode
    /// failures all read as `None`.
    pub fn load<T: DeserializeOwned>(&self, key: StoreKey) -> Option<T> {
        match self.try_load(key) {
            Ok(value) => value,
            Err(e) => {
                error!("[store] Failed to load {}: {}", key, e);
                None
            }
        }
    }

    pub fn remove(&self, key: StoreKey) -> bool {
        let conn = self.conn.lock();
        match conn.execute("DELETE FROM state WHERE key = ?1", params![key.as_str()]) {
            Ok(n) => n > 0,
            Err(e) => {
                error!("[store] Failed to remove {}: {}", key, e);
                false
            }
        }
    }

    pub fn clear_all(&self) -> bool {
        let conn = self.conn.lock();
        match conn.execute("DELETE FROM state", []) {
            Ok(n) => {
                info!("[store] Cleared {} persisted entries", n);
                true
            }
            Err(e) => {
                error!("[store] Failed to clear state: {}", e);
                false
            }
        }
    }

    /// Keys currently holding a value.
    pub fn keys(&self) -> Vec<String> {
        let conn = self.conn.lock();
        let result = conn
            .prepare("SELECT key FROM state ORDER BY key")
            .and_then(|mut stmt| {
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()
            });
        result.unwrap_or_else(|e| {
            error!("[store] Failed to list keys: {}", e);
            Vec::new()
        })
    }
}
