use formstore_core::CoreError;
use formstore_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("principal {principal} is not authorized to {action} {resource_id}")]
    Unauthorized {
        principal: String,
        resource_id: String,
        action: &'static str,
    },

    #[error("resource deleted: {0}")]
    ResourceDeleted(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("field {field_id} not found in form class {class_id}")]
    FieldNotFound { class_id: String, field_id: String },

    #[error("cannot move {resource_id} under {owner_id}, which it owns")]
    OwnershipCycle { resource_id: String, owner_id: String },

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("form class {0} references itself through its fields")]
    CyclicSchema(String),

    #[error("form tree deeper than {max_depth} levels at {class_id}")]
    SchemaTooDeep { class_id: String, max_depth: usize },
}

impl EngineError {
    /// Consistency errors mean broken stored state; the whole request aborts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Consistency(_) | Self::Storage(StorageError::Inconsistent(_))
        )
    }

    pub(crate) fn unauthorized(
        principal: &formstore_core::PrincipalId,
        resource_id: &formstore_core::ResourceId,
        action: &'static str,
    ) -> Self {
        Self::Unauthorized {
            principal: principal.to_string(),
            resource_id: resource_id.to_string(),
            action,
        }
    }
}
