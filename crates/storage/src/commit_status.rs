use std::cell::RefCell;
use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::error;

use formstore_core::CommitMarker;

use crate::error::StorageError;

/// Per-connection cache of commit marker to version. Only positive
/// (committed) versions are cached since they never change.
#[derive(Default)]
pub struct CommitStatusCache {
    committed: RefCell<HashMap<CommitMarker, u64>>,
}

impl CommitStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of a pending write, or `None` while it is still uncommitted.
    pub fn committed_version(
        &self,
        conn: &Connection,
        marker: CommitMarker,
    ) -> Result<Option<u64>, StorageError> {
        if let Some(version) = self.committed.borrow().get(&marker) {
            return Ok(Some(*version));
        }
        let stored: Option<i64> = conn
            .query_row(
                "SELECT version FROM commit_status WHERE commit_marker = ?1",
                rusqlite::params![marker.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(v) if v > 0 => {
                let version = v as u64;
                self.committed.borrow_mut().insert(marker, version);
                Ok(Some(version))
            }
            Some(0) => Ok(None),
            Some(v) => {
                error!(%marker, version = v, "commit status reports negative version");
                Err(StorageError::Inconsistent(format!(
                    "commit {marker} has non-positive version {v}"
                )))
            }
            None => {
                error!(%marker, "no commit status recorded");
                Err(StorageError::Inconsistent(format!(
                    "no commit status for {marker}"
                )))
            }
        }
    }

    /// Like [`Self::committed_version`], but an uncommitted write is an error.
    pub fn version_of(
        &self,
        conn: &Connection,
        marker: CommitMarker,
    ) -> Result<u64, StorageError> {
        self.committed_version(conn, marker)?.ok_or_else(|| {
            error!(%marker, "version requested for an uncommitted write");
            StorageError::Inconsistent(format!("commit {marker} has non-positive version 0"))
        })
    }

    pub fn record(&self, marker: CommitMarker, version: u64) {
        self.committed.borrow_mut().insert(marker, version);
    }
}
