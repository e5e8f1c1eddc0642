//! SQLite-backed data units and repository pool.
//!
//! Every execution owns one repository database,
//! `<working_dir>/exec_<id>/repository.sqlite`, shared by all data units of
//! that execution. A data unit is a named partition of that database plus its
//! own directory for file payloads.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! unitcache-core = { path = "../unitcache-core", features = ["sqlite"] }
//! ```

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::error::{DataUnitError, PoolError};
use crate::infrastructure::{DataUnit, DataUnitDescriptor, DataUnitFactory, RepositoryPool};
use crate::types::ExecutionId;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock_conn(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-execution repository connections.
///
/// Uses WAL mode so browsing readers don't block each other.
pub struct SqliteRepositoryPool {
    working_dir: PathBuf,
    repositories: Mutex<HashMap<ExecutionId, SharedConnection>>,
}

impl SqliteRepositoryPool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the repository database of `execution_id`.
    pub fn repository_path(&self, execution_id: ExecutionId) -> PathBuf {
        self.working_dir
            .join(format!("exec_{}", execution_id))
            .join("repository.sqlite")
    }

    /// Open (or reuse) the repository of `execution_id`.
    pub fn open(&self, execution_id: ExecutionId) -> Result<SharedConnection, DataUnitError> {
        let mut repositories = self.repositories();
        if let Some(conn) = repositories.get(&execution_id) {
            return Ok(Arc::clone(conn));
        }

        let path = self.repository_path(execution_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS data_units (
                uri        TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                directory  TEXT NOT NULL,
                loaded_at  INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS entries (
                data_unit  TEXT NOT NULL,
                subject    TEXT NOT NULL,
                predicate  TEXT NOT NULL,
                object     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_data_unit ON entries(data_unit);",
        )?;
        tracing::info!(execution_id, path = %path.display(), "Repository opened");

        let conn = Arc::new(Mutex::new(conn));
        repositories.insert(execution_id, Arc::clone(&conn));
        Ok(conn)
    }

    /// Whether the repository of `execution_id` is currently open.
    pub fn is_open(&self, execution_id: ExecutionId) -> bool {
        self.repositories().contains_key(&execution_id)
    }

    fn repositories(&self) -> MutexGuard<'_, HashMap<ExecutionId, SharedConnection>> {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl RepositoryPool for SqliteRepositoryPool {
    fn release(&self, execution_id: ExecutionId) -> Result<(), PoolError> {
        let Some(conn) = self.repositories().remove(&execution_id) else {
            return Ok(());
        };

        // Handles still held by callers keep the connection alive until dropped.
        match Arc::try_unwrap(conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                conn.close().map_err(|(_, e)| PoolError::Release {
                    execution_id,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::debug!(execution_id, "Repository still referenced, closing on last drop");
                Ok(())
            }
        }
    }

    fn probe(&self) -> Result<(), PoolError> {
        let unavailable = |e: rusqlite::Error| PoolError::Unavailable(e.to_string());

        std::fs::create_dir_all(&self.working_dir)
            .map_err(|e| PoolError::Unavailable(e.to_string()))?;
        let conn = Connection::open(self.working_dir.join("probe.sqlite")).map_err(unavailable)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS probe (id INTEGER PRIMARY KEY, checked_at INTEGER NOT NULL);",
        )
        .map_err(unavailable)?;

        conn.execute("INSERT INTO probe (checked_at) VALUES (?1)", params![SystemClock.now_ms()])
            .map_err(unavailable)?;
        let id = conn.last_insert_rowid();
        let found: Option<i64> = conn
            .query_row("SELECT id FROM probe WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(unavailable)?;
        conn.execute("DELETE FROM probe WHERE id = ?1", params![id])
            .map_err(unavailable)?;

        match found {
            Some(_) => Ok(()),
            None => Err(PoolError::Unavailable("probe row was not readable".to_string())),
        }
    }
}

/// A data unit stored in its execution's repository.
pub struct SqliteDataUnit {
    name: String,
    uri: String,
    directory: PathBuf,
    repository: Mutex<Option<SharedConnection>>,
}

impl SqliteDataUnit {
    /// Add one entry to the data unit.
    pub fn insert_entry(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<(), DataUnitError> {
        let conn = self.connection()?;
        lock_conn(&conn).execute(
            "INSERT INTO entries (data_unit, subject, predicate, object) VALUES (?1, ?2, ?3, ?4)",
            params![self.uri, subject, predicate, object],
        )?;
        Ok(())
    }

    /// Number of entries in the data unit.
    pub fn entry_count(&self) -> Result<u64, DataUnitError> {
        let conn = self.connection()?;
        let count = lock_conn(&conn).query_row(
            "SELECT COUNT(*) FROM entries WHERE data_unit = ?1",
            params![self.uri],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn connection(&self) -> Result<SharedConnection, DataUnitError> {
        self.repository
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| DataUnitError::Release {
                name: self.name.clone(),
                reason: "data unit has been released".to_string(),
            })
    }
}

impl DataUnit for SqliteDataUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn load(&self) -> Result<(), DataUnitError> {
        std::fs::create_dir_all(&self.directory)?;
        let conn = self.connection()?;
        lock_conn(&conn)
            .execute(
                "INSERT OR IGNORE INTO data_units (uri, name, directory, loaded_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    self.uri,
                    self.name,
                    self.directory.to_string_lossy(),
                    SystemClock.now_ms()
                ],
            )
            .map_err(|e| DataUnitError::Load {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn release(&self) -> Result<(), DataUnitError> {
        let released = self
            .repository
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match released {
            Some(_) => Ok(()),
            None => Err(DataUnitError::Release {
                name: self.name.clone(),
                reason: "already released".to_string(),
            }),
        }
    }
}

/// Creates [`SqliteDataUnit`]s inside repositories of a [`SqliteRepositoryPool`].
pub struct SqliteDataUnitFactory {
    pool: Arc<SqliteRepositoryPool>,
}

impl SqliteDataUnitFactory {
    pub fn new(pool: Arc<SqliteRepositoryPool>) -> Self {
        Self { pool }
    }

    /// Like [`DataUnitFactory::create`] but keeps the concrete type.
    pub fn create_unit(
        &self,
        descriptor: &DataUnitDescriptor,
    ) -> Result<Arc<SqliteDataUnit>, DataUnitError> {
        let repository = self
            .pool
            .open(descriptor.execution_id)
            .map_err(|e| DataUnitError::Create {
                name: descriptor.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(SqliteDataUnit {
            name: descriptor.name.clone(),
            uri: descriptor.uri.clone(),
            directory: descriptor.directory.clone(),
            repository: Mutex::new(Some(repository)),
        }))
    }
}

impl DataUnitFactory for SqliteDataUnitFactory {
    fn create(&self, descriptor: &DataUnitDescriptor) -> Result<Arc<dyn DataUnit>, DataUnitError> {
        let unit: Arc<dyn DataUnit> = self.create_unit(descriptor)?;
        Ok(unit)
    }
}
