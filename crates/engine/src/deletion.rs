use std::collections::HashSet;

use tracing::error;

use formstore_core::ResourceId;
use formstore_storage::ResourceStore;

use crate::error::EngineError;

/// A resource is effectively deleted if it or any ancestor up to the root
/// carries a tombstone.
pub fn is_effectively_deleted<S: ResourceStore + ?Sized>(
    store: &S,
    resource_id: &ResourceId,
) -> Result<bool, EngineError> {
    let mut current = resource_id.clone();
    let mut visited = HashSet::new();
    while !current.is_root() {
        if !visited.insert(current.clone()) {
            error!(%resource_id, at = %current, "ownership chain contains a cycle");
            return Err(EngineError::Consistency(format!("ownership cycle at {current}")));
        }
        match store.get(&current)? {
            Some(record) if record.deleted => return Ok(true),
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
    Ok(false)
}

/// True if `ancestor` appears on the ownership chain from `resource_id`
/// (inclusive) up to the root.
pub fn owner_chain_contains<S: ResourceStore + ?Sized>(
    store: &S,
    resource_id: &ResourceId,
    ancestor: &ResourceId,
) -> Result<bool, EngineError> {
    let mut current = resource_id.clone();
    let mut visited = HashSet::new();
    while !current.is_root() {
        if &current == ancestor {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            error!(%resource_id, at = %current, "ownership chain contains a cycle");
            return Err(EngineError::Consistency(format!("ownership cycle at {current}")));
        }
        match store.get(&current)? {
            Some(record) => current = record.owner_id,
            None => return Err(EngineError::NotFound(current.to_string())),
        }
    }
    Ok(false)
}

pub fn assert_not_deleted<S: ResourceStore + ?Sized>(
    store: &S,
    resource_id: &ResourceId,
) -> Result<(), EngineError> {
    if is_effectively_deleted(store, resource_id)? {
        Err(EngineError::ResourceDeleted(resource_id.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use formstore_core::{PrincipalId, Record, Resource};
    use formstore_storage::SqliteStorage;

    use super::*;

    fn put(store: &mut SqliteStorage, id: &str, owner: &str) {
        let resource = Resource::new(
            ResourceId::new(id),
            ResourceId::new(owner),
            ResourceId::new("_folder"),
            Record::new(),
        );
        store.put(&resource, &PrincipalId::new("u1")).unwrap();
    }

    fn chain(links: &[(&str, &str)]) -> SqliteStorage {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        for (id, owner) in links {
            put(&mut store, id, owner);
        }
        store
    }

    #[test]
    fn tombstone_on_any_ancestor_deletes() {
        let mut store = chain(&[("a", "_root"), ("b", "a"), ("c", "b"), ("d", "c")]);
        assert!(!is_effectively_deleted(&store, &ResourceId::new("d")).unwrap());
        store.set_deleted(&ResourceId::new("b"), &PrincipalId::new("u1")).unwrap();
        for id in ["b", "c", "d"] {
            assert!(is_effectively_deleted(&store, &ResourceId::new(id)).unwrap());
        }
        assert!(!is_effectively_deleted(&store, &ResourceId::new("a")).unwrap());
        assert!(matches!(
            assert_not_deleted(&store, &ResourceId::new("d")),
            Err(EngineError::ResourceDeleted(_))
        ));
    }

    #[test]
    fn dangling_owner_is_fatal() {
        let store = chain(&[("b", "ghost"), ("c", "b")]);
        let err = is_effectively_deleted(&store, &ResourceId::new("c")).unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
        assert!(err.is_fatal());
        assert!(matches!(
            is_effectively_deleted(&store, &ResourceId::new("ghost")),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn owner_cycle_is_fatal() {
        let store = chain(&[("a", "b"), ("b", "a"), ("c", "a")]);
        let err = is_effectively_deleted(&store, &ResourceId::new("c")).unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
        assert!(err.is_fatal());
        assert!(owner_chain_contains(&store, &ResourceId::new("c"), &ResourceId::new("c")).unwrap());
        assert!(owner_chain_contains(&store, &ResourceId::new("c"), &ResourceId::new("b")).unwrap());
        assert!(owner_chain_contains(&store, &ResourceId::new("x"), &ResourceId::new("y")).is_err());
    }

    #[test]
    fn chain_membership_stops_at_root() {
        let store = chain(&[("a", "_root"), ("b", "a"), ("c", "b")]);
        assert!(owner_chain_contains(&store, &ResourceId::new("c"), &ResourceId::new("a")).unwrap());
        assert!(!owner_chain_contains(&store, &ResourceId::new("a"), &ResourceId::new("c")).unwrap());
    }
}
