pub mod authorization;
pub mod config;
pub mod deletion;
pub mod error;
pub mod form_tree;
pub mod query;

pub use authorization::Authorization;
pub use config::WorkspaceConfig;
pub use error::EngineError;
pub use form_tree::{FormTree, FormTreeBuilder, FormTreeNode};
pub use query::{ColumnSet, ColumnView, QueryRequest};

use tracing::{debug, info};

use formstore_core::acr::ACR_CLASS_ID;
use formstore_core::form::{FORM_CLASS_ID, LABEL_FIELD_ID};
use formstore_core::{
    AccessControlRule, CommitMarker, FieldValue, FormClass, PrincipalId, Record, Resource,
    ResourceId,
};
use formstore_storage::{ResourceRecord, ResourceStore, SnapshotRecord, SqliteStorage};

use crate::form_tree::StoreFormClassProvider;

/// Class id of plain folders (databases) that own forms and other folders.
pub const FOLDER_CLASS_ID: &str = "_folder";

/// A child entry as returned by [`Workspace::children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub owner_id: ResourceId,
    pub class_id: ResourceId,
    pub version: u64,
    pub label: Option<String>,
}

/// A multi-tenant workspace: one version counter, one ownership tree.
/// Every operation is performed on behalf of a principal and checked
/// against the access rules on the ownership chain.
pub struct Workspace {
    storage: SqliteStorage,
    config: WorkspaceConfig,
}

impl Workspace {
    pub fn open(config: WorkspaceConfig) -> Result<Self, EngineError> {
        let storage = match &config.db_path {
            Some(path) => SqliteStorage::open(path, config.busy_timeout())?,
            None => SqliteStorage::open_in_memory()?,
        };
        info!(db = ?config.db_path, max_tree_depth = config.max_tree_depth, "workspace opened");
        Ok(Self { storage, config })
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::open(WorkspaceConfig::in_memory())
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn current_version(&self) -> Result<u64, EngineError> {
        Ok(self.storage.current_version()?)
    }

    pub fn authorize(
        &self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<Authorization, EngineError> {
        Authorization::resolve(&self.storage, principal, resource_id)
    }

    pub fn is_deleted(&self, resource_id: &ResourceId) -> Result<bool, EngineError> {
        deletion::is_effectively_deleted(&self.storage, resource_id)
    }

    pub fn assert_not_deleted(&self, resource_id: &ResourceId) -> Result<(), EngineError> {
        deletion::assert_not_deleted(&self.storage, resource_id)
    }

    /// Creates a top-level folder owned by `owner`. This is the only write
    /// allowed directly under the root and is not access checked.
    pub fn create_root_folder(
        &mut self,
        owner: &PrincipalId,
        label: &str,
    ) -> Result<ResourceId, EngineError> {
        let folder = Resource::new(
            ResourceId::generate(),
            ResourceId::root(),
            ResourceId::new(FOLDER_CLASS_ID),
            Record::new().with("label", FieldValue::Text(label.to_string())),
        );
        let rule = AccessControlRule::owner_rule(folder.id.clone(), owner.clone());
        self.storage
            .put_batch(&[folder.clone(), rule.as_resource()], owner)?;
        info!(folder_id = %folder.id, %owner, "root folder created");
        Ok(folder.id)
    }

    /// Writes a resource after checking the principal may edit it (or its
    /// owner, for new resources). Returns the version it was stamped with.
    pub fn put_resource(
        &mut self,
        principal: &PrincipalId,
        resource: &Resource,
    ) -> Result<u64, EngineError> {
        self.check_write(principal, resource)?;
        let version = self.storage.put(resource, principal)?;
        debug!(resource_id = %resource.id, version, "resource written");
        Ok(version)
    }

    /// Like [`Self::put_resource`] but the version is assigned by a later
    /// [`Self::commit_pending`].
    pub fn put_pending(
        &mut self,
        principal: &PrincipalId,
        resource: &Resource,
    ) -> Result<CommitMarker, EngineError> {
        self.check_write(principal, resource)?;
        Ok(self.storage.put_pending(resource, principal)?)
    }

    /// Assigns the next workspace version to a pending write and indexes it.
    pub fn commit_pending(&mut self, marker: CommitMarker) -> Result<u64, EngineError> {
        let version = self.storage.commit_pending(marker)?;
        self.storage.index_commit(marker)?;
        Ok(version)
    }

    pub fn put_form_class(
        &mut self,
        principal: &PrincipalId,
        form_class: &FormClass,
    ) -> Result<u64, EngineError> {
        self.put_resource(principal, &form_class.as_resource())
    }

    pub fn get_resource(
        &self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<Resource, EngineError> {
        let resource = self
            .storage
            .get_resource(resource_id)?
            .ok_or_else(|| EngineError::NotFound(resource_id.to_string()))?;
        self.assert_not_deleted(resource_id)?;
        self.authorize(principal, resource_id)?.assert_can_view()?;
        Ok(resource)
    }

    pub fn get_form_class(
        &self,
        principal: &PrincipalId,
        class_id: &ResourceId,
    ) -> Result<FormClass, EngineError> {
        let resource = self.get_resource(principal, class_id)?;
        Ok(FormClass::from_resource(&resource)?)
    }

    pub fn delete_resource(
        &mut self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<u64, EngineError> {
        if self.storage.get(resource_id)?.is_none() {
            return Err(EngineError::NotFound(resource_id.to_string()));
        }
        self.assert_not_deleted(resource_id)?;
        self.authorize(principal, resource_id)?.assert_can_edit()?;
        let version = self.storage.set_deleted(resource_id, principal)?;
        info!(%resource_id, %principal, version, "resource deleted");
        Ok(version)
    }

    /// Visible, non-deleted children of `owner_id`, access rules excluded.
    pub fn children(
        &self,
        principal: &PrincipalId,
        owner_id: &ResourceId,
    ) -> Result<Vec<ResourceNode>, EngineError> {
        if !owner_id.is_root() {
            self.assert_not_deleted(owner_id)?;
        }
        let mut nodes = Vec::new();
        for record in self.storage.query_children(owner_id)? {
            if record.deleted || record.class_id.as_str() == ACR_CLASS_ID {
                continue;
            }
            let Some(version) = self.storage.committed_version(&record)? else {
                continue;
            };
            if !self.authorize(principal, &record.resource_id)?.can_view() {
                continue;
            }
            nodes.push(to_node(&record, version));
        }
        Ok(nodes)
    }

    /// Writes an access rule. Only owners of the governed resource may do so.
    pub fn grant_rule(
        &mut self,
        principal: &PrincipalId,
        rule: &AccessControlRule,
    ) -> Result<u64, EngineError> {
        self.assert_owner(principal, &rule.resource_id)?;
        let mut rule = rule.clone();
        rule.id = AccessControlRule::calculate_id(&rule.resource_id, &rule.principal_id);
        let version = self.storage.put(&rule.as_resource(), principal)?;
        info!(rule_id = %rule.id, grantee = %rule.principal_id, owner = rule.owner, "access rule written");
        Ok(version)
    }

    pub fn revoke_rule(
        &mut self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
        grantee: &PrincipalId,
    ) -> Result<u64, EngineError> {
        self.assert_owner(principal, resource_id)?;
        let rule_id = AccessControlRule::calculate_id(resource_id, grantee);
        Ok(self.storage.set_deleted(&rule_id, principal)?)
    }

    /// Rules attached directly to `resource_id`. Owners only.
    pub fn access_control_rules(
        &self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<Vec<AccessControlRule>, EngineError> {
        self.assert_owner(principal, resource_id)?;
        let mut rules = Vec::new();
        for record in self.storage.query_children(resource_id)? {
            if record.deleted || record.class_id.as_str() != ACR_CLASS_ID {
                continue;
            }
            let version = self.storage.resolve_version(&record)?;
            rules.push(AccessControlRule::from_resource(&record.to_resource(version))?);
        }
        Ok(rules)
    }

    pub fn form_tree(
        &self,
        principal: &PrincipalId,
        class_id: &ResourceId,
    ) -> Result<FormTree, EngineError> {
        self.assert_not_deleted(class_id)?;
        self.authorize(principal, class_id)?.assert_can_view()?;
        FormTreeBuilder::new(&StoreFormClassProvider(&self.storage), self.config.max_tree_depth)
            .build(class_id)
    }

    pub fn query(&self, request: &QueryRequest) -> Result<ColumnSet, EngineError> {
        query::execute(&self.storage, request, self.config.max_tree_depth)
    }

    pub fn snapshots(
        &self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<Vec<SnapshotRecord>, EngineError> {
        self.authorize(principal, resource_id)?.assert_can_view()?;
        Ok(self.storage.snapshots(resource_id)?)
    }

    fn assert_owner(
        &self,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<(), EngineError> {
        if self.authorize(principal, resource_id)?.is_owner() {
            Ok(())
        } else {
            Err(EngineError::unauthorized(principal, resource_id, "manage access to"))
        }
    }

    /// New resources are checked against their owner, existing ones against
    /// themselves and, when moved, against the new owner too.
    fn check_write(&self, principal: &PrincipalId, resource: &Resource) -> Result<(), EngineError> {
        if resource.class_id.as_str() == ACR_CLASS_ID || AccessControlRule::is_acr_id(&resource.id) {
            return Err(EngineError::unauthorized(principal, &resource.id, "write rule"));
        }
        if resource.owner_id.is_root() {
            return Err(EngineError::unauthorized(principal, &resource.id, "create under root"));
        }
        if resource.class_id.as_str() == FORM_CLASS_ID {
            FormClass::from_resource(resource)?.validate()?;
        }
        match self.storage.get(&resource.id)? {
            Some(existing) => {
                self.assert_not_deleted(&resource.id)?;
                self.authorize(principal, &resource.id)?.assert_can_edit()?;
                if existing.owner_id != resource.owner_id {
                    if deletion::owner_chain_contains(&self.storage, &resource.owner_id, &resource.id)? {
                        return Err(EngineError::OwnershipCycle {
                            resource_id: resource.id.to_string(),
                            owner_id: resource.owner_id.to_string(),
                        });
                    }
                    self.assert_not_deleted(&resource.owner_id)?;
                    self.authorize(principal, &resource.owner_id)?.assert_can_edit()?;
                }
            }
            None => {
                self.assert_not_deleted(&resource.owner_id)?;
                self.authorize(principal, &resource.owner_id)?.assert_can_edit()?;
            }
        }
        Ok(())
    }
}

fn to_node(record: &ResourceRecord, version: u64) -> ResourceNode {
    let label = record
        .value
        .get_text(LABEL_FIELD_ID)
        .or_else(|| record.value.get_text("label"))
        .map(str::to_string);
    ResourceNode {
        id: record.resource_id.clone(),
        owner_id: record.owner_id.clone(),
        class_id: record.class_id.clone(),
        version,
        label,
    }
}
