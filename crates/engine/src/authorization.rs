//! Access control: the first rule found walking up a resource's ownership
//! chain governs it.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, error, warn};

use formstore_core::expr::{self, Value};
use formstore_core::{AccessControlRule, PrincipalId, Resource, ResourceId};
use formstore_storage::ResourceStore;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Authorization {
    principal: PrincipalId,
    resource_id: ResourceId,
    rule: Option<AccessControlRule>,
}

impl Authorization {
    /// No rule: everything is denied.
    pub fn none(principal: PrincipalId, resource_id: ResourceId) -> Self {
        Self {
            principal,
            resource_id,
            rule: None,
        }
    }

    pub fn from_rule(
        principal: PrincipalId,
        resource_id: ResourceId,
        rule: AccessControlRule,
    ) -> Self {
        if rule.principal_id != principal {
            warn!(%principal, rule_id = %rule.id, "rule names a different principal");
            return Self::none(principal, resource_id);
        }
        Self {
            principal,
            resource_id,
            rule: Some(rule),
        }
    }

    /// Trusts a stored rule resource only if it parses and names `principal`.
    /// Anything else yields a denying authorization rather than an error.
    pub fn from_rule_resource(
        principal: PrincipalId,
        resource_id: ResourceId,
        rule_resource: &Resource,
    ) -> Self {
        match AccessControlRule::from_resource(rule_resource) {
            Ok(rule) => Self::from_rule(principal, resource_id, rule),
            Err(err) => {
                warn!(rule_id = %rule_resource.id, error = %err, "ignoring malformed access rule");
                Self::none(principal, resource_id)
            }
        }
    }

    /// Walks from `resource_id` to the root looking for a rule for `principal`.
    pub fn resolve<S: ResourceStore + ?Sized>(
        store: &S,
        principal: &PrincipalId,
        resource_id: &ResourceId,
    ) -> Result<Self, EngineError> {
        let mut current = resource_id.clone();
        let mut visited = HashSet::new();
        loop {
            if current.is_root() {
                debug!(%principal, %resource_id, "no access rule on ownership chain");
                return Ok(Self::none(principal.clone(), resource_id.clone()));
            }
            if !visited.insert(current.clone()) {
                error!(%resource_id, at = %current, "ownership chain contains a cycle");
                return Err(EngineError::Consistency(format!(
                    "ownership cycle at {current}"
                )));
            }

            let rule_id = AccessControlRule::calculate_id(&current, principal);
            if let Some(record) = store.get(&rule_id)?
                && !record.deleted
            {
                let version = store.resolve_version(&record)?;
                return Ok(Self::from_rule_resource(
                    principal.clone(),
                    resource_id.clone(),
                    &record.to_resource(version),
                ));
            }

            match store.get(&current)? {
                Some(record) => current = record.owner_id,
                None if &current == resource_id => {
                    return Err(EngineError::NotFound(resource_id.to_string()));
                }
                None => {
                    error!(%resource_id, missing = %current, "dangling owner in ownership chain");
                    return Err(EngineError::Consistency(format!(
                        "owner {current} of {resource_id} does not exist"
                    )));
                }
            }
        }
    }

    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn rule(&self) -> Option<&AccessControlRule> {
        self.rule.as_ref()
    }

    pub fn is_owner(&self) -> bool {
        self.rule.as_ref().is_some_and(|r| r.owner)
    }

    pub fn can_view(&self) -> bool {
        match &self.rule {
            Some(rule) if rule.owner => true,
            Some(rule) => self.evaluate(rule.view_condition.as_deref()),
            None => false,
        }
    }

    pub fn can_edit(&self) -> bool {
        match &self.rule {
            Some(rule) if rule.owner => true,
            Some(rule) => self.evaluate(rule.edit_condition.as_deref()),
            None => false,
        }
    }

    /// True only when the resource is visible now and was not under
    /// `previous`. Without a previous authorization there is no transition.
    pub fn can_view_now_but_not_as_of(&self, previous: Option<&Authorization>) -> bool {
        match previous {
            Some(previous) => self.can_view() && !previous.can_view(),
            None => false,
        }
    }

    pub fn assert_can_view(&self) -> Result<(), EngineError> {
        if self.can_view() {
            Ok(())
        } else {
            Err(EngineError::unauthorized(&self.principal, &self.resource_id, "view"))
        }
    }

    pub fn assert_can_edit(&self) -> Result<(), EngineError> {
        if self.can_edit() {
            Ok(())
        } else {
            Err(EngineError::unauthorized(&self.principal, &self.resource_id, "edit"))
        }
    }

    /// Conditions see `principal` and `resource` as text. A condition that is
    /// absent, fails, or is not boolean denies.
    fn evaluate(&self, condition: Option<&str>) -> bool {
        let Some(condition) = condition else {
            return false;
        };
        let ctx = BTreeMap::from([
            ("principal".to_string(), Value::Text(self.principal.to_string())),
            ("resource".to_string(), Value::Text(self.resource_id.to_string())),
        ]);
        match expr::evaluate(condition, &ctx) {
            Ok(Value::Boolean(allowed)) => allowed,
            Ok(other) => {
                debug!(%condition, result = %other, "access condition is not boolean");
                false
            }
            Err(err) => {
                warn!(%condition, error = %err, "access condition failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use formstore_core::{FieldValue, Record};

    use super::*;

    fn rule(view: Option<&str>, edit: Option<&str>) -> AccessControlRule {
        AccessControlRule::conditional(
            ResourceId::new("db1"),
            ResourceId::new("u1"),
            view.map(str::to_string),
            edit.map(str::to_string),
        )
    }

    fn auth(rule: AccessControlRule) -> Authorization {
        Authorization::from_rule(ResourceId::new("u1"), ResourceId::new("site1"), rule)
    }

    #[test]
    fn owner_rule_grants_everything() {
        let a = auth(AccessControlRule::owner_rule(
            ResourceId::new("db1"),
            ResourceId::new("u1"),
        ));
        assert!(a.is_owner());
        assert!(a.can_view());
        assert!(a.can_edit());
        assert!(a.assert_can_edit().is_ok());
    }

    #[test]
    fn conditions_are_evaluated() {
        let a = auth(rule(Some("true"), Some("FALSE")));
        assert!(a.can_view());
        assert!(!a.can_edit());
        assert!(matches!(
            a.assert_can_edit(),
            Err(EngineError::Unauthorized { action: "edit", .. })
        ));

        let a = auth(rule(Some("principal == 'u1'"), Some("resource == 'other'")));
        assert!(a.can_view());
        assert!(!a.can_edit());
    }

    #[test]
    fn absent_or_broken_conditions_deny() {
        assert!(!auth(rule(None, None)).can_view());
        assert!(!auth(rule(Some("(true"), None)).can_view());
        assert!(!auth(rule(Some("1 + 1"), None)).can_view());
        assert!(!auth(rule(Some("principal && true"), None)).can_view());
    }

    #[test]
    fn rule_for_other_principal_is_ignored() {
        let other = AccessControlRule::owner_rule(ResourceId::new("db1"), ResourceId::new("u2"));
        let a = Authorization::from_rule_resource(
            ResourceId::new("u1"),
            ResourceId::new("db1"),
            &other.as_resource(),
        );
        assert!(a.rule().is_none());
        assert!(!a.can_view());
    }

    #[test]
    fn malformed_rule_resource_denies() {
        let mut resource = rule(Some("true"), None).as_resource();
        resource.value = Record::new().with("owner", FieldValue::Boolean(true));
        let a = Authorization::from_rule_resource(
            ResourceId::new("u1"),
            ResourceId::new("db1"),
            &resource,
        );
        assert!(!a.can_view());
    }

    #[test]
    fn visibility_transition() {
        let visible = auth(rule(Some("true"), None));
        let hidden = auth(rule(Some("false"), None));
        assert!(visible.can_view_now_but_not_as_of(Some(&hidden)));
        assert!(!visible.can_view_now_but_not_as_of(Some(&visible)));
        assert!(!hidden.can_view_now_but_not_as_of(Some(&visible)));
        assert!(!visible.can_view_now_but_not_as_of(None));
    }

    fn store_with(links: &[(&str, &str)]) -> formstore_storage::SqliteStorage {
        let mut store = formstore_storage::SqliteStorage::open_in_memory().unwrap();
        for (id, owner) in links {
            let resource = Resource::new(
                ResourceId::new(*id),
                ResourceId::new(*owner),
                ResourceId::new("_folder"),
                Record::new(),
            );
            store.put(&resource, &ResourceId::new("u1")).unwrap();
        }
        store
    }

    #[test]
    fn resolve_finds_rule_on_ancestor() {
        let mut store = store_with(&[("db1", "_root"), ("form", "db1"), ("site1", "form")]);
        let owner = AccessControlRule::owner_rule(ResourceId::new("db1"), ResourceId::new("u1"));
        store.put(&owner.as_resource(), &ResourceId::new("u1")).unwrap();

        let a = Authorization::resolve(&store, &ResourceId::new("u1"), &ResourceId::new("site1")).unwrap();
        assert!(a.is_owner());
        assert_eq!(a.resource_id().as_str(), "site1");

        store.set_deleted(&owner.id, &ResourceId::new("u1")).unwrap();
        let a = Authorization::resolve(&store, &ResourceId::new("u1"), &ResourceId::new("site1")).unwrap();
        assert!(a.rule().is_none());
    }

    #[test]
    fn resolve_reports_broken_chains() {
        let store = store_with(&[("a", "ghost"), ("b", "c"), ("c", "b")]);
        let u1 = ResourceId::new("u1");

        let err = Authorization::resolve(&store, &u1, &ResourceId::new("a")).unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
        assert!(err.is_fatal());

        let err = Authorization::resolve(&store, &u1, &ResourceId::new("b")).unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
        assert!(err.is_fatal());

        let err = Authorization::resolve(&store, &u1, &ResourceId::new("missing")).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(!err.is_fatal());
    }
}
