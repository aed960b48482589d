use chrono::{DateTime, Utc};

use formstore_core::{CommitMarker, PrincipalId, Record, Resource, ResourceId};

use crate::error::StorageError;

/// How a stored resource knows its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStamp {
    Committed(u64),
    /// Written ahead of its version; resolved through the commit-status table.
    Pending(CommitMarker),
}

/// Latest stored state of a resource.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub resource_id: ResourceId,
    pub owner_id: ResourceId,
    pub class_id: ResourceId,
    pub version: VersionStamp,
    pub deleted: bool,
    pub value: Record,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn to_resource(&self, version: u64) -> Resource {
        Resource {
            id: self.resource_id.clone(),
            owner_id: self.owner_id.clone(),
            class_id: self.class_id.clone(),
            version,
            value: self.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub resource_id: ResourceId,
    pub version: u64,
    pub committed_at: DateTime<Utc>,
    pub principal: PrincipalId,
}

pub trait ResourceStore {
    /// Workspace version; 1 if nothing has been written yet.
    fn current_version(&self) -> Result<u64, StorageError>;

    fn increment_version(&mut self) -> Result<u64, StorageError>;

    fn get(&self, resource_id: &ResourceId) -> Result<Option<ResourceRecord>, StorageError>;

    /// Definitive version of a record, consulting commit status for pending writes.
    fn resolve_version(&self, record: &ResourceRecord) -> Result<u64, StorageError>;

    /// Like `resolve_version`, but `None` for a pending write that has not
    /// been committed yet. Readers skip such records.
    fn committed_version(&self, record: &ResourceRecord) -> Result<Option<u64>, StorageError>;

    fn get_resource(&self, resource_id: &ResourceId) -> Result<Option<Resource>, StorageError> {
        match self.get(resource_id)? {
            Some(record) => {
                let version = self.resolve_version(&record)?;
                Ok(Some(record.to_resource(version)))
            }
            None => Ok(None),
        }
    }

    /// Writes a resource stamped with a fresh workspace version.
    fn put(&mut self, resource: &Resource, principal: &PrincipalId) -> Result<u64, StorageError>;

    /// Writes all resources in one transaction, each with its own version.
    fn put_batch(
        &mut self,
        resources: &[Resource],
        principal: &PrincipalId,
    ) -> Result<Vec<u64>, StorageError>;

    /// Sets the tombstone flag. Counts as a mutation and returns its version.
    fn set_deleted(
        &mut self,
        resource_id: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<u64, StorageError>;

    /// Writes a resource whose version is assigned later by `commit_pending`.
    fn put_pending(
        &mut self,
        resource: &Resource,
        principal: &PrincipalId,
    ) -> Result<CommitMarker, StorageError>;

    fn commit_pending(&mut self, marker: CommitMarker) -> Result<u64, StorageError>;

    /// Copies a committed marker's version into the resource rows that carry
    /// it. Returns the number of rows updated.
    fn index_commit(&mut self, marker: CommitMarker) -> Result<usize, StorageError>;

    fn query_children(&self, owner_id: &ResourceId) -> Result<Vec<ResourceRecord>, StorageError>;

    /// All resources of a class, tombstoned ones included, in insertion order.
    fn query_instances_of_class(
        &self,
        class_id: &ResourceId,
    ) -> Result<Vec<ResourceRecord>, StorageError>;

    fn snapshots(&self, resource_id: &ResourceId) -> Result<Vec<SnapshotRecord>, StorageError>;
}
