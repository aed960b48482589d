use serde::{Deserialize, Serialize};

use crate::field_value::Record;
use crate::ids::ResourceId;

/// A uniquely identified, owned, versioned record of typed data.
///
/// `version` is zero until the resource has been committed to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub owner_id: ResourceId,
    pub class_id: ResourceId,
    pub version: u64,
    pub value: Record,
}

impl Resource {
    pub fn new(
        id: ResourceId,
        owner_id: ResourceId,
        class_id: ResourceId,
        value: Record,
    ) -> Self {
        Self {
            id,
            owner_id,
            class_id,
            version: 0,
            value,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.version > 0
    }
}
