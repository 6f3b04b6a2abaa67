//! Schema DDL, the version store, and the migration engine.
//!
//! Steps are additive only — guarded table creation, guarded column
//! addition; no step ever drops or renames a column. Re-running a step
//! against an already-migrated store is a no-op, which keeps partial-failure
//! recovery safe: the version store records each step as it completes, so a
//! retry resumes exactly where the last run stopped.

use crate::error::{StorageError, StorageResult};
use duckdb::{params, Connection};
use tracing::info;

/// Highest migration step known to this build.
pub const TARGET_SCHEMA_VERSION: i64 = 3;

const SCHEMA_META_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key VARCHAR PRIMARY KEY,
    value BIGINT NOT NULL
);
"#;

/// v1 — ideas table and its date indices. The `date_index` column stores
/// the date with separators stripped (`YYYYMMDD`) for prefix range queries.
const IDEAS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS ideas (
    id VARCHAR PRIMARY KEY,
    hint VARCHAR NOT NULL DEFAULT '',
    detail TEXT NOT NULL DEFAULT '',
    date VARCHAR NOT NULL,
    date_index VARCHAR NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ideas_date ON ideas(date);
CREATE INDEX IF NOT EXISTS idx_ideas_date_index ON ideas(date_index);
"#;

/// v2 — category tag and completion flag.
const IDEAS_ADD_TAGGING: &str = r#"
ALTER TABLE ideas ADD COLUMN IF NOT EXISTS category VARCHAR;
ALTER TABLE ideas ADD COLUMN IF NOT EXISTS completed BOOLEAN DEFAULT FALSE;
"#;

/// v3 — ordered blocks owned by an idea.
const BLOCKS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    id VARCHAR PRIMARY KEY,
    block_id VARCHAR NOT NULL,
    idea_id VARCHAR NOT NULL,
    kind VARCHAR NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL DEFAULT 0,
    color VARCHAR,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    UNIQUE (idea_id, block_id)
);
CREATE INDEX IF NOT EXISTS idx_blocks_idea_order ON blocks(idea_id, order_index);
"#;

/// Creates the version store table if it does not exist yet. The version
/// store lives apart from idea/block data so it is readable before any
/// migration has run.
pub fn ensure_version_store(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(SCHEMA_META_DDL)?;
    Ok(())
}

/// Reads the applied-migration version. 0 if never set.
pub fn schema_version(conn: &Connection) -> StorageResult<i64> {
    let result = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, i64>(0),
    );
    match result {
        Ok(v) => Ok(v),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Records the applied-migration version.
pub fn set_schema_version(conn: &Connection, version: i64) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('schema_version', ?)",
        params![version],
    )?;
    Ok(())
}

/// Bootstraps the version store and migrates to `TARGET_SCHEMA_VERSION`.
pub fn migrate(conn: &Connection) -> StorageResult<()> {
    ensure_version_store(conn)?;
    let current = schema_version(conn)?;
    run_migrations(conn, current, TARGET_SCHEMA_VERSION)
}

/// Applies every registered step in `(current + 1)..=target`, recording the
/// version store after each one. A failing step aborts the run with the
/// version store still pointing at the last completed step. A version with
/// no registered step is a hard error, never skipped — continuing would
/// leave the schema permanently below its declared target.
pub fn run_migrations(conn: &Connection, current: i64, target: i64) -> StorageResult<()> {
    if current >= target {
        return Ok(());
    }
    for version in (current + 1)..=target {
        apply_step(conn, version)?;
        set_schema_version(conn, version)?;
        info!("[MIGRATE] schema at version {version}");
    }
    Ok(())
}

fn apply_step(conn: &Connection, version: i64) -> StorageResult<()> {
    let ddl = match version {
        1 => IDEAS_DDL,
        2 => IDEAS_ADD_TAGGING,
        3 => BLOCKS_DDL,
        v => return Err(StorageError::UnknownMigrationVersion(v)),
    };
    conn.execute_batch(ddl).map_err(|e| StorageError::Migration {
        version,
        message: e.to_string(),
    })
}
