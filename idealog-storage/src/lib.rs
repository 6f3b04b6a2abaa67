//! DuckDB storage layer for Idealog.
//!
//! Provides persistent storage for Ideas and the ordered Blocks they own.
//! One `Storage` engine instance is constructed at process start and
//! injected wherever repository access is needed; the repositories are
//! cheap cloneable handles sharing the engine's connection.
//!
//! # Architecture
//!
//! - Ideas and Blocks live in two related tables; Blocks carry the owning
//!   idea id and a per-idea ordering index
//! - A `schema_meta` table holds the single applied-migration version
//! - Schema migrations are additive only and run automatically on open

mod block_store;
mod error;
mod idea_store;
pub mod schema;

pub use block_store::BlockStore;
pub use error::{StorageError, StorageResult};
pub use idea_store::{date_index, IdeaStore};

use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// The embedded storage engine. Exclusively owns its DuckDB connection;
/// all mutating repository calls serialize through it.
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Opens (or creates) the database at `path` and migrates it to the
    /// current schema version. Any failure here is fatal to startup.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_duckdb_with_wal_recovery(path, "256MB", 2)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory engine (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Initialization(e.to_string()))?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Repository handle for Ideas.
    pub fn ideas(&self) -> IdeaStore {
        IdeaStore::new(self.conn.clone())
    }

    /// Repository handle for Blocks.
    pub fn blocks(&self) -> BlockStore {
        BlockStore::new(self.conn.clone())
    }

    /// The schema version currently recorded in the version store.
    pub fn schema_version(&self) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        schema::schema_version(&conn)
    }
}

/// Open a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the
/// database, it is removed and the open is retried once. This handles the
/// common case where an unclean shutdown leaves a WAL file that prevents
/// reopening.
///
/// `memory_limit` and `threads` cap per-database resource usage (DuckDB
/// defaults to ~80% of system RAM and all cores, far too aggressive for a
/// note store embedded in an interactive app).
pub fn open_duckdb_with_wal_recovery(
    path: &Path,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<Connection> {
    let conn = match Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                warn!(
                    "[STORAGE] open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    if let Ok(c) = Connection::open(path) {
                        apply_resource_limits(&c, memory_limit, threads)?;
                        return Ok(c);
                    }
                }
            }
            return Err(StorageError::Initialization(first_err.to_string()));
        }
    };
    apply_resource_limits(&conn, memory_limit, threads)?;
    Ok(conn)
}

/// Apply memory and thread limits to a DuckDB connection.
fn apply_resource_limits(
    conn: &Connection,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{}'; PRAGMA threads={};",
        memory_limit, threads
    ))?;
    Ok(())
}

/// Current wall-clock time as epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
