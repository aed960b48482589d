use std::time::Duration;

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS global_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS resources (
    rowid INTEGER PRIMARY KEY,
    resource_id TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    class_id TEXT NOT NULL,
    version INTEGER,
    commit_marker BLOB CHECK (commit_marker IS NULL OR length(commit_marker) = 16),
    deleted INTEGER NOT NULL DEFAULT 0,
    content BLOB NOT NULL,
    content_hash BLOB NOT NULL CHECK (length(content_hash) = 32),
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK ((version IS NULL) <> (commit_marker IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_resources_owner ON resources (owner_id);
CREATE INDEX IF NOT EXISTS idx_resources_class ON resources (class_id);
CREATE INDEX IF NOT EXISTS idx_resources_marker ON resources (commit_marker) WHERE commit_marker IS NOT NULL;

CREATE TABLE IF NOT EXISTS commit_status (
    commit_marker BLOB PRIMARY KEY CHECK (length(commit_marker) = 16),
    version INTEGER NOT NULL DEFAULT 0,
    principal TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    resource_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    committed_at INTEGER NOT NULL,
    principal TEXT NOT NULL,
    PRIMARY KEY (resource_id, version)
);
";
