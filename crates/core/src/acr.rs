use crate::error::CoreError;
use crate::field_value::{FieldValue, Record};
use crate::ids::{PrincipalId, ResourceId};
use crate::resource::Resource;

/// Class id of access control rule resources.
pub const ACR_CLASS_ID: &str = "_acr";
const ID_PREFIX: &str = "_acr-";

/// Grants a principal access to a resource and, unless overridden further
/// down, to everything beneath it in the ownership chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlRule {
    pub id: ResourceId,
    pub resource_id: ResourceId,
    pub principal_id: PrincipalId,
    pub owner: bool,
    /// Boolean expression gating view access; absent means deny.
    pub view_condition: Option<String>,
    pub edit_condition: Option<String>,
}

impl AccessControlRule {
    pub fn calculate_id(resource_id: &ResourceId, principal_id: &PrincipalId) -> ResourceId {
        ResourceId::new(format!("{ID_PREFIX}{resource_id}-{principal_id}"))
    }

    pub fn is_acr_id(id: &ResourceId) -> bool {
        id.as_str().starts_with(ID_PREFIX)
    }

    /// A rule making the principal an owner: full view and edit rights.
    pub fn owner_rule(resource_id: ResourceId, principal_id: PrincipalId) -> Self {
        Self {
            id: Self::calculate_id(&resource_id, &principal_id),
            resource_id,
            principal_id,
            owner: true,
            view_condition: None,
            edit_condition: None,
        }
    }

    pub fn conditional(
        resource_id: ResourceId,
        principal_id: PrincipalId,
        view_condition: Option<String>,
        edit_condition: Option<String>,
    ) -> Self {
        Self {
            id: Self::calculate_id(&resource_id, &principal_id),
            resource_id,
            principal_id,
            owner: false,
            view_condition,
            edit_condition,
        }
    }

    pub fn as_resource(&self) -> Resource {
        let mut value = Record::new()
            .with("principal", FieldValue::Reference(vec![self.principal_id.clone()]))
            .with("owner", FieldValue::Boolean(self.owner));
        if let Some(view) = &self.view_condition {
            value.set("view", FieldValue::Expr(view.clone()));
        }
        if let Some(edit) = &self.edit_condition {
            value.set("edit", FieldValue::Expr(edit.clone()));
        }
        Resource::new(
            self.id.clone(),
            self.resource_id.clone(),
            ResourceId::new(ACR_CLASS_ID),
            value,
        )
    }

    pub fn from_resource(resource: &Resource) -> Result<Self, CoreError> {
        if resource.class_id.as_str() != ACR_CLASS_ID {
            return Err(CoreError::InvalidData(format!(
                "resource {} is not an access control rule",
                resource.id
            )));
        }
        let principal_id = match resource.value.get("principal") {
            Some(FieldValue::Reference(ids)) if ids.len() == 1 => ids[0].clone(),
            other => {
                return Err(CoreError::InvalidData(format!(
                    "rule {} has invalid principal: {other:?}",
                    resource.id
                )));
            }
        };
        let condition = |key: &str| match resource.value.get(key) {
            Some(FieldValue::Expr(e)) | Some(FieldValue::Text(e)) => Some(e.clone()),
            _ => None,
        };
        Ok(Self {
            id: resource.id.clone(),
            resource_id: resource.owner_id.clone(),
            principal_id,
            owner: resource.value.get_boolean("owner").unwrap_or(false),
            view_condition: condition("view"),
            edit_condition: condition("edit"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_derived_from_resource_and_principal() {
        let id = AccessControlRule::calculate_id(&ResourceId::new("db1"), &ResourceId::new("u1"));
        assert_eq!(id.as_str(), "_acr-db1-u1");
        assert!(AccessControlRule::is_acr_id(&id));
        assert!(!AccessControlRule::is_acr_id(&ResourceId::new("db1")));
    }

    #[test]
    fn rule_resource_roundtrip() {
        let rule = AccessControlRule::conditional(
            ResourceId::new("db1"),
            ResourceId::new("u1"),
            Some("true".into()),
            None,
        );
        let resource = rule.as_resource();
        assert_eq!(resource.owner_id.as_str(), "db1");
        assert_eq!(AccessControlRule::from_resource(&resource).unwrap(), rule);

        let owner = AccessControlRule::owner_rule(ResourceId::new("db1"), ResourceId::new("u2"));
        let restored = AccessControlRule::from_resource(&owner.as_resource()).unwrap();
        assert!(restored.owner);
        assert!(restored.view_condition.is_none());
    }

    #[test]
    fn missing_principal_is_invalid() {
        let resource = Resource::new(
            ResourceId::new("_acr-db1-u1"),
            ResourceId::new("db1"),
            ResourceId::new(ACR_CLASS_ID),
            Record::new().with("owner", FieldValue::Boolean(true)),
        );
        assert!(matches!(
            AccessControlRule::from_resource(&resource),
            Err(CoreError::InvalidData(_))
        ));
    }
}
