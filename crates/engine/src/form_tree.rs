//! Resolves a root form class into a tree of fields, descending into the
//! classes that reference and embedded-record fields point at.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error};

use formstore_core::form::{COMMIT_TIME_FIELD_ID, CREATOR_FIELD_ID};
use formstore_core::{FieldId, FieldType, FormClass, FormField, ResourceId};
use formstore_storage::ResourceStore;

use crate::deletion;
use crate::error::EngineError;

/// Source of form class definitions.
pub trait FormClassProvider {
    fn get_form_class(&self, class_id: &ResourceId) -> Result<Option<FormClass>, EngineError>;

    /// Deleted classes are left out of trees that reference them.
    fn is_deleted(&self, _class_id: &ResourceId) -> Result<bool, EngineError> {
        Ok(false)
    }
}

/// Reads form classes straight from a resource store, without caching.
pub struct StoreFormClassProvider<'a, S: ?Sized>(pub &'a S);

impl<S: ResourceStore + ?Sized> FormClassProvider for StoreFormClassProvider<'_, S> {
    fn get_form_class(&self, class_id: &ResourceId) -> Result<Option<FormClass>, EngineError> {
        match self.0.get_resource(class_id)? {
            Some(resource) => Ok(Some(FormClass::from_resource(&resource)?)),
            None => Ok(None),
        }
    }

    fn is_deleted(&self, class_id: &ResourceId) -> Result<bool, EngineError> {
        deletion::is_effectively_deleted(self.0, class_id)
    }
}

impl FormClassProvider for HashMap<ResourceId, FormClass> {
    fn get_form_class(&self, class_id: &ResourceId) -> Result<Option<FormClass>, EngineError> {
        Ok(self.get(class_id).cloned())
    }
}

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct FormTreeNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Class whose schema declares this field.
    pub defining_class: ResourceId,
    pub field: FormField,
    /// Synthesized rather than declared by any schema.
    pub intrinsic: bool,
}

impl FormTreeNode {
    pub fn field_id(&self) -> &FieldId {
        &self.field.id
    }

    pub fn range(&self) -> BTreeSet<ResourceId> {
        self.field.field_type.range()
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.field.field_type, FieldType::Reference { .. })
    }
}

/// Arena of resolved fields. Built per request and never cached.
#[derive(Debug, Clone)]
pub struct FormTree {
    root_class: FormClass,
    nodes: Vec<FormTreeNode>,
    roots: Vec<NodeId>,
}

impl FormTree {
    pub fn root_class(&self) -> &FormClass {
        &self.root_class
    }

    pub fn node(&self, id: NodeId) -> &FormTreeNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_fields(&self) -> impl Iterator<Item = &FormTreeNode> {
        self.roots.iter().map(|&id| &self.nodes[id])
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &FormTreeNode> {
        self.nodes[id].children.iter().map(|&c| &self.nodes[c])
    }

    /// Finds a node by dotted field path, e.g. `address.city`.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut candidates = &self.roots;
        let mut found = None;
        for segment in path.split('.') {
            let id = candidates
                .iter()
                .copied()
                .find(|&id| self.nodes[id].field.id.as_str() == segment)?;
            found = Some(id);
            candidates = &self.nodes[id].children;
        }
        found
    }

    /// Field ids from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<FieldId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            path.push(node.field.id.clone());
            current = node.parent;
        }
        path.reverse();
        path
    }

    fn push(&mut self, parent: Option<NodeId>, defining_class: ResourceId, field: FormField, intrinsic: bool) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(FormTreeNode {
            parent,
            children: Vec::new(),
            defining_class,
            field,
            intrinsic,
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }
}

pub fn intrinsic_fields() -> [FormField; 2] {
    [
        FormField::new(CREATOR_FIELD_ID, "Submitted by", FieldType::Text).read_only(),
        FormField::new(COMMIT_TIME_FIELD_ID, "Submission time", FieldType::Instant).read_only(),
    ]
}

pub struct FormTreeBuilder<'a, P: FormClassProvider + ?Sized> {
    provider: &'a P,
    max_depth: usize,
}

impl<'a, P: FormClassProvider + ?Sized> FormTreeBuilder<'a, P> {
    pub fn new(provider: &'a P, max_depth: usize) -> Self {
        Self {
            provider,
            max_depth,
        }
    }

    pub fn build(&self, root_class_id: &ResourceId) -> Result<FormTree, EngineError> {
        let root_class = self
            .provider
            .get_form_class(root_class_id)?
            .ok_or_else(|| EngineError::NotFound(root_class_id.to_string()))?;

        let mut tree = FormTree {
            root_class: root_class.clone(),
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        for field in intrinsic_fields() {
            tree.push(None, root_class.id.clone(), field, true);
        }

        let mut path = vec![root_class.id.clone()];
        let mut fetched = HashMap::new();
        self.add_fields(&mut tree, None, &root_class, &mut path, &mut fetched)?;
        debug!(root = %root_class_id, nodes = tree.len(), "form tree resolved");
        Ok(tree)
    }

    /// `path` holds the classes currently being expanded, root first.
    /// `fetched` holds every class read so far; `None` marks a deleted one.
    fn add_fields(
        &self,
        tree: &mut FormTree,
        parent: Option<NodeId>,
        class: &FormClass,
        path: &mut Vec<ResourceId>,
        fetched: &mut HashMap<ResourceId, Option<FormClass>>,
    ) -> Result<(), EngineError> {
        for field in class.fields() {
            let node = tree.push(parent, class.id.clone(), field.clone(), false);
            let embedded = matches!(field.field_type, FieldType::EmbeddedRecord { .. });
            for target in field.field_type.range() {
                if path.contains(&target) {
                    if embedded {
                        return Err(EngineError::CyclicSchema(target.to_string()));
                    }
                    // reference back into a class being expanded: leave as a leaf
                    debug!(field = %field.id, %target, "reference cycle not expanded");
                    continue;
                }
                if path.len() > self.max_depth {
                    return Err(EngineError::SchemaTooDeep {
                        class_id: target.to_string(),
                        max_depth: self.max_depth,
                    });
                }
                let Some(target_class) = self.fetch(fetched, class, field, &target)? else {
                    debug!(field = %field.id, %target, "deleted form class not expanded");
                    continue;
                };
                path.push(target);
                self.add_fields(tree, Some(node), &target_class, path, fetched)?;
                path.pop();
            }
        }
        Ok(())
    }

    fn fetch(
        &self,
        fetched: &mut HashMap<ResourceId, Option<FormClass>>,
        class: &FormClass,
        field: &FormField,
        target: &ResourceId,
    ) -> Result<Option<FormClass>, EngineError> {
        if let Some(cached) = fetched.get(target) {
            return Ok(cached.clone());
        }
        let target_class = match self.provider.get_form_class(target)? {
            Some(_) if self.provider.is_deleted(target)? => None,
            Some(target_class) => Some(target_class),
            None => {
                error!(field = %field.id, %target, "referenced form class does not exist");
                return Err(EngineError::Consistency(format!(
                    "field {} of {} references missing form class {target}",
                    field.id, class.id
                )));
            }
        };
        fetched.insert(target.clone(), target_class.clone());
        Ok(target_class)
    }
}
