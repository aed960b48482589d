//! The workspace version counter: one row, incremented inside the same
//! transaction as the write it stamps.

use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;

/// Version reported before the counter has ever been written.
pub const INITIAL_VERSION: u64 = 1;

pub fn read_version(conn: &Connection) -> Result<u64, StorageError> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM global_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => Ok(INITIAL_VERSION),
        Some(v) => to_version(v),
    }
}

/// Reads or initializes the counter, adds one and returns the new value.
/// The caller must hold a write transaction on `conn`.
pub fn next_version(conn: &Connection) -> Result<u64, StorageError> {
    conn.execute(
        "INSERT INTO global_version (id, version) VALUES (1, ?1) ON CONFLICT(id) DO NOTHING",
        rusqlite::params![INITIAL_VERSION as i64],
    )?;
    conn.execute(
        "UPDATE global_version SET version = version + 1 WHERE id = 1",
        [],
    )?;
    let version: i64 =
        conn.query_row("SELECT version FROM global_version WHERE id = 1", [], |row| {
            row.get(0)
        })?;
    to_version(version)
}

fn to_version(v: i64) -> Result<u64, StorageError> {
    match u64::try_from(v) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(StorageError::Inconsistent(format!(
            "workspace version counter holds {v}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::schema::init_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, Duration::from_millis(100)).unwrap();
        conn
    }

    #[test]
    fn uninitialized_counter_reads_one() {
        let conn = conn();
        assert_eq!(read_version(&conn).unwrap(), 1);
    }

    #[test]
    fn first_increment_returns_two() {
        let mut conn = conn();
        let tx = conn.transaction().unwrap();
        assert_eq!(next_version(&tx).unwrap(), 2);
        assert_eq!(next_version(&tx).unwrap(), 3);
        tx.commit().unwrap();
        assert_eq!(read_version(&conn).unwrap(), 3);
    }

    #[test]
    fn rolled_back_increment_is_not_observed() {
        let mut conn = conn();
        {
            let tx = conn.transaction().unwrap();
            next_version(&tx).unwrap();
            // dropped without commit
        }
        assert_eq!(read_version(&conn).unwrap(), 1);
    }
}
