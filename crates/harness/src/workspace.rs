use formstore_core::{
    AccessControlRule, FieldValue, FormClass, FormField, PrincipalId, Record, Resource,
    ResourceId,
};
use formstore_engine::{EngineError, FOLDER_CLASS_ID, Workspace};

use crate::shared::SharedDb;

pub const OWNER: &str = "u-owner";

/// A workspace with one root folder owned by [`OWNER`].
pub struct TestWorkspace {
    pub workspace: Workspace,
    pub owner: PrincipalId,
    pub folder: ResourceId,
    _db: Option<SharedDb>,
}

impl TestWorkspace {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_workspace(Workspace::open_in_memory()?, None)
    }

    pub fn on_disk() -> Result<Self, Box<dyn std::error::Error>> {
        let db = SharedDb::new()?;
        let workspace = db.open()?;
        Ok(Self::with_workspace(workspace, Some(db))?)
    }

    fn with_workspace(mut workspace: Workspace, db: Option<SharedDb>) -> Result<Self, EngineError> {
        let owner = ResourceId::new(OWNER);
        let folder = workspace.create_root_folder(&owner, "Test database")?;
        Ok(Self {
            workspace,
            owner,
            folder,
            _db: db,
        })
    }

    pub fn create_folder(
        &mut self,
        parent: &ResourceId,
        label: &str,
    ) -> Result<ResourceId, EngineError> {
        let folder = Resource::new(
            ResourceId::generate(),
            parent.clone(),
            ResourceId::new(FOLDER_CLASS_ID),
            Record::new().with("label", FieldValue::Text(label.to_string())),
        );
        self.workspace.put_resource(&self.owner, &folder)?;
        Ok(folder.id)
    }

    /// Creates a form class in the root folder.
    pub fn create_form(
        &mut self,
        label: &str,
        fields: Vec<FormField>,
    ) -> Result<FormClass, EngineError> {
        let folder = self.folder.clone();
        self.create_form_in(&folder, label, fields)
    }

    pub fn create_form_in(
        &mut self,
        owner: &ResourceId,
        label: &str,
        fields: Vec<FormField>,
    ) -> Result<FormClass, EngineError> {
        let form = fields.into_iter().fold(
            FormClass::new(ResourceId::generate(), owner.clone(), label),
            FormClass::with_field,
        );
        self.workspace.put_form_class(&self.owner, &form)?;
        Ok(form)
    }

    /// Creates an instance of `form`, owned by the form itself.
    pub fn create_instance(
        &mut self,
        form: &FormClass,
        fields: Vec<(&str, FieldValue)>,
    ) -> Result<ResourceId, EngineError> {
        let value = fields
            .into_iter()
            .fold(Record::new(), |record, (key, value)| record.with(key, value));
        let instance = Resource::new(ResourceId::generate(), form.id.clone(), form.id.clone(), value);
        self.workspace.put_resource(&self.owner, &instance)?;
        Ok(instance.id)
    }

    pub fn grant(
        &mut self,
        resource_id: &ResourceId,
        principal: &str,
        view: Option<&str>,
        edit: Option<&str>,
    ) -> Result<u64, EngineError> {
        let rule = AccessControlRule::conditional(
            resource_id.clone(),
            ResourceId::new(principal),
            view.map(str::to_string),
            edit.map(str::to_string),
        );
        self.workspace.grant_rule(&self.owner, &rule)
    }
}
