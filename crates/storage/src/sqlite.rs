use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, error};

use formstore_core::{CommitMarker, PrincipalId, Record, Resource, ResourceId};

use crate::commit_status::CommitStatusCache;
use crate::error::StorageError;
use crate::traits::{ResourceRecord, ResourceStore, SnapshotRecord, VersionStamp};
use crate::version;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn to_timestamp(ms: i64, label: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Inconsistent(format!("invalid {label} timestamp {ms}")))
}

const RECORD_COLUMNS: &str = "resource_id, owner_id, class_id, version, commit_marker, deleted, content, content_hash, created_by, created_at";

pub struct SqliteStorage {
    conn: Connection,
    commit_status: CommitStatusCache,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn, busy_timeout)?;
        Ok(Self {
            conn,
            commit_status: CommitStatusCache::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            commit_status: CommitStatusCache::new(),
        })
    }

    /// Write transactions take the database lock up front so that the
    /// version read and increment cannot interleave with another writer.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StorageError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    fn query_records(
        &self,
        where_clause: &str,
        key: &str,
    ) -> Result<Vec<ResourceRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM resources WHERE {where_clause} ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![key], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRecord::decode).collect()
    }
}

/// Row columns as stored. Decoding and hash checks happen outside the
/// row mapper so their errors keep their own variants.
struct RawRecord {
    resource_id: String,
    owner_id: String,
    class_id: String,
    version: Option<i64>,
    marker: Option<Vec<u8>>,
    deleted: bool,
    content: Vec<u8>,
    content_hash: Vec<u8>,
    created_by: String,
    created_at: i64,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            resource_id: row.get(0)?,
            owner_id: row.get(1)?,
            class_id: row.get(2)?,
            version: row.get(3)?,
            marker: row.get(4)?,
            deleted: row.get(5)?,
            content: row.get(6)?,
            content_hash: row.get(7)?,
            created_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<ResourceRecord, StorageError> {
        let resource_id = self.resource_id;
        let expected = to_array::<32>(self.content_hash, "content_hash")?;
        if blake3::hash(&self.content).as_bytes() != &expected {
            error!(%resource_id, "content hash mismatch");
            return Err(StorageError::Inconsistent(format!(
                "content of {resource_id} does not match its hash"
            )));
        }

        let version = match (self.version, self.marker) {
            (Some(v), _) if v > 0 => VersionStamp::Committed(v as u64),
            (None, Some(bytes)) => {
                VersionStamp::Pending(CommitMarker::from_bytes(to_array::<16>(bytes, "commit_marker")?))
            }
            (v, _) => {
                return Err(StorageError::Inconsistent(format!(
                    "resource {resource_id} has invalid version {v:?}"
                )));
            }
        };

        Ok(ResourceRecord {
            resource_id: ResourceId::new(resource_id),
            owner_id: ResourceId::new(self.owner_id),
            class_id: ResourceId::new(self.class_id),
            version,
            deleted: self.deleted,
            value: Record::from_msgpack(&self.content)?,
            created_by: ResourceId::new(self.created_by),
            created_at: to_timestamp(self.created_at, "created_at")?,
        })
    }
}

/// Upserts the resource row. `created_by`/`created_at` are kept from the
/// first write. Writing a tombstoned row makes it live again; callers decide
/// whether that is allowed.
fn write_resource(
    tx: &Transaction,
    resource: &Resource,
    stamp: VersionStamp,
    principal: &PrincipalId,
    now_ms: i64,
) -> Result<(), StorageError> {
    let content = resource.value.to_msgpack()?;
    let hash = blake3::hash(&content);
    let (version, marker): (Option<i64>, Option<Vec<u8>>) = match stamp {
        VersionStamp::Committed(v) => (Some(v as i64), None),
        VersionStamp::Pending(m) => (None, Some(m.as_bytes().to_vec())),
    };
    tx.execute(
        "INSERT INTO resources (resource_id, owner_id, class_id, version, commit_marker, deleted, content, content_hash, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9)
         ON CONFLICT(resource_id) DO UPDATE SET owner_id = excluded.owner_id, class_id = excluded.class_id,
             version = excluded.version, commit_marker = excluded.commit_marker, deleted = 0,
             content = excluded.content, content_hash = excluded.content_hash",
        rusqlite::params![
            resource.id.as_str(),
            resource.owner_id.as_str(),
            resource.class_id.as_str(),
            version,
            marker,
            content,
            hash.as_bytes().as_slice(),
            principal.as_str(),
            now_ms,
        ],
    )?;
    Ok(())
}

fn record_snapshot(
    tx: &Transaction,
    resource_id: &ResourceId,
    version: u64,
    principal: &PrincipalId,
    now_ms: i64,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO snapshots (resource_id, version, committed_at, principal) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![resource_id.as_str(), version as i64, now_ms, principal.as_str()],
    )?;
    Ok(())
}

impl ResourceStore for SqliteStorage {
    fn current_version(&self) -> Result<u64, StorageError> {
        version::read_version(&self.conn)
    }

    fn increment_version(&mut self) -> Result<u64, StorageError> {
        let tx = self.write_tx()?;
        let v = version::next_version(&tx)?;
        tx.commit()?;
        Ok(v)
    }

    fn get(&self, resource_id: &ResourceId) -> Result<Option<ResourceRecord>, StorageError> {
        let mut records = self.query_records("resource_id = ?1", resource_id.as_str())?;
        Ok(records.pop())
    }

    fn resolve_version(&self, record: &ResourceRecord) -> Result<u64, StorageError> {
        match record.version {
            VersionStamp::Committed(v) => Ok(v),
            VersionStamp::Pending(marker) => self.commit_status.version_of(&self.conn, marker),
        }
    }

    fn committed_version(&self, record: &ResourceRecord) -> Result<Option<u64>, StorageError> {
        match record.version {
            VersionStamp::Committed(v) => Ok(Some(v)),
            VersionStamp::Pending(marker) => self.commit_status.committed_version(&self.conn, marker),
        }
    }

    fn put(&mut self, resource: &Resource, principal: &PrincipalId) -> Result<u64, StorageError> {
        let mut versions = self.put_batch(std::slice::from_ref(resource), principal)?;
        versions
            .pop()
            .ok_or_else(|| StorageError::Inconsistent("batch write returned no version".into()))
    }

    fn put_batch(
        &mut self,
        resources: &[Resource],
        principal: &PrincipalId,
    ) -> Result<Vec<u64>, StorageError> {
        let now_ms = Utc::now().timestamp_millis();
        let tx = self.write_tx()?;
        let mut versions = Vec::with_capacity(resources.len());
        for resource in resources {
            let v = version::next_version(&tx)?;
            write_resource(&tx, resource, VersionStamp::Committed(v), principal, now_ms)?;
            record_snapshot(&tx, &resource.id, v, principal, now_ms)?;
            versions.push(v);
        }
        tx.commit()?;
        debug!(count = resources.len(), versions = ?versions, "resources written");
        Ok(versions)
    }

    fn set_deleted(
        &mut self,
        resource_id: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<u64, StorageError> {
        let now_ms = Utc::now().timestamp_millis();
        let tx = self.write_tx()?;
        let v = version::next_version(&tx)?;
        let updated = tx.execute(
            "UPDATE resources SET deleted = 1, version = ?1, commit_marker = NULL WHERE resource_id = ?2",
            rusqlite::params![v as i64, resource_id.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(resource_id.to_string()));
        }
        record_snapshot(&tx, resource_id, v, principal, now_ms)?;
        tx.commit()?;
        debug!(%resource_id, version = v, "resource tombstoned");
        Ok(v)
    }

    fn put_pending(
        &mut self,
        resource: &Resource,
        principal: &PrincipalId,
    ) -> Result<CommitMarker, StorageError> {
        let now_ms = Utc::now().timestamp_millis();
        let marker = CommitMarker::new();
        let tx = self.write_tx()?;
        tx.execute(
            "INSERT INTO commit_status (commit_marker, version, principal) VALUES (?1, 0, ?2)",
            rusqlite::params![marker.as_bytes().as_slice(), principal.as_str()],
        )?;
        write_resource(&tx, resource, VersionStamp::Pending(marker), principal, now_ms)?;
        tx.commit()?;
        debug!(resource_id = %resource.id, %marker, "pending write");
        Ok(marker)
    }

    fn commit_pending(&mut self, marker: CommitMarker) -> Result<u64, StorageError> {
        let now_ms = Utc::now().timestamp_millis();
        let tx = self.write_tx()?;
        let status: Option<(i64, String)> = tx
            .query_row(
                "SELECT version, principal FROM commit_status WHERE commit_marker = ?1",
                rusqlite::params![marker.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (existing, principal) =
            status.ok_or_else(|| StorageError::NotFound(format!("commit {marker}")))?;
        if existing > 0 {
            // already committed; commits are idempotent
            return Ok(existing as u64);
        }
        let v = version::next_version(&tx)?;
        tx.execute(
            "UPDATE commit_status SET version = ?1 WHERE commit_marker = ?2",
            rusqlite::params![v as i64, marker.as_bytes().as_slice()],
        )?;
        let resource_ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT resource_id FROM resources WHERE commit_marker = ?1")?;
            let ids = stmt
                .query_map(rusqlite::params![marker.as_bytes().as_slice()], |row| {
                    row.get(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        let principal = ResourceId::new(principal);
        for resource_id in &resource_ids {
            record_snapshot(&tx, &ResourceId::new(resource_id.as_str()), v, &principal, now_ms)?;
        }
        tx.commit()?;
        self.commit_status.record(marker, v);
        debug!(%marker, version = v, "pending write committed");
        Ok(v)
    }

    fn index_commit(&mut self, marker: CommitMarker) -> Result<usize, StorageError> {
        let v = self.commit_status.version_of(&self.conn, marker)?;
        let tx = self.write_tx()?;
        let updated = tx.execute(
            "UPDATE resources SET version = ?1, commit_marker = NULL WHERE commit_marker = ?2",
            rusqlite::params![v as i64, marker.as_bytes().as_slice()],
        )?;
        tx.commit()?;
        Ok(updated)
    }

    fn query_children(&self, owner_id: &ResourceId) -> Result<Vec<ResourceRecord>, StorageError> {
        self.query_records("owner_id = ?1", owner_id.as_str())
    }

    fn query_instances_of_class(
        &self,
        class_id: &ResourceId,
    ) -> Result<Vec<ResourceRecord>, StorageError> {
        self.query_records("class_id = ?1", class_id.as_str())
    }

    fn snapshots(&self, resource_id: &ResourceId) -> Result<Vec<SnapshotRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT resource_id, version, committed_at, principal FROM snapshots WHERE resource_id = ?1 ORDER BY version",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![resource_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, version, committed_at, principal)| {
                Ok(SnapshotRecord {
                    resource_id: ResourceId::new(id),
                    version: version as u64,
                    committed_at: to_timestamp(committed_at, "committed_at")?,
                    principal: ResourceId::new(principal),
                })
            })
            .collect()
    }
}
