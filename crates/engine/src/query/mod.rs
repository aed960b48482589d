//! Column queries: one builder per requested field, fed every admitted
//! instance of the root form class in store order.

mod builders;
mod column;
mod factory;

pub use builders::{ColumnBuilder, FieldReader, InstanceRow};
pub use column::{BOOLEAN_NA, ColumnType, ColumnView};
pub use factory::create_builder;

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use formstore_core::expr::{self, Value};
use formstore_core::form::{COMMIT_TIME_FIELD_ID, CREATOR_FIELD_ID, ID_FIELD_ID};
use formstore_core::{FieldType, PrincipalId, ResourceId};
use formstore_storage::ResourceStore;

use crate::authorization::Authorization;
use crate::deletion;
use crate::error::EngineError;
use crate::form_tree::{FormTree, FormTreeBuilder, NodeId, StoreFormClassProvider};

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub root_class_id: ResourceId,
    /// Field ids, or dotted paths into embedded records.
    pub field_ids: Vec<String>,
    pub principal: PrincipalId,
    /// Rows are kept only where this evaluates to `true`.
    pub filter: Option<String>,
}

impl QueryRequest {
    pub fn new<I, S>(root_class_id: ResourceId, principal: PrincipalId, field_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root_class_id,
            field_ids: field_ids.into_iter().map(Into::into).collect(),
            principal,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Query result: equal-length columns keyed by requested field id.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    columns: BTreeMap<String, ColumnView>,
    num_rows: usize,
}

impl ColumnSet {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn column(&self, field_id: &str) -> Option<&ColumnView> {
        self.columns.get(field_id)
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnView> {
        &self.columns
    }

    /// One JSON object per row; gaps are omitted.
    pub fn to_json_rows(&self) -> Vec<JsonValue> {
        (0..self.num_rows)
            .map(|row| {
                let mut object = Map::new();
                for (field_id, column) in &self.columns {
                    if let Some(value) = column.json_value(row) {
                        object.insert(field_id.clone(), value);
                    }
                }
                JsonValue::Object(object)
            })
            .collect()
    }
}

pub fn execute<S: ResourceStore + ?Sized>(
    store: &S,
    request: &QueryRequest,
    max_tree_depth: usize,
) -> Result<ColumnSet, EngineError> {
    let root = &request.root_class_id;
    Authorization::resolve(store, &request.principal, root)?.assert_can_view()?;
    deletion::assert_not_deleted(store, root)?;

    let tree = FormTreeBuilder::new(&StoreFormClassProvider(store), max_tree_depth).build(root)?;

    let mut builders: Vec<(String, Box<dyn ColumnBuilder>)> = Vec::new();
    for field_id in &request.field_ids {
        if let Some(builder) = builder_for(&tree, field_id)? {
            builders.push((field_id.clone(), builder));
        }
    }
    let filter = request.filter.as_deref().map(expr::parse).transpose()?;

    let mut num_rows = 0;
    for record in store.query_instances_of_class(root)? {
        if record.deleted || deletion::is_effectively_deleted(store, &record.owner_id)? {
            continue;
        }
        if store.committed_version(&record)?.is_none() {
            debug!(resource_id = %record.resource_id, "uncommitted write skipped");
            continue;
        }
        if !Authorization::resolve(store, &request.principal, &record.resource_id)?.can_view() {
            continue;
        }
        if let Some(filter) = &filter {
            match filter.evaluate(&record.value) {
                Ok(Value::Boolean(true)) => {}
                Ok(_) => continue,
                Err(err) => {
                    debug!(resource_id = %record.resource_id, error = %err, "filter failed; row excluded");
                    continue;
                }
            }
        }
        let row = InstanceRow {
            id: &record.resource_id,
            value: &record.value,
            created_by: &record.created_by,
            created_at: record.created_at,
        };
        for (_, builder) in builders.iter_mut() {
            builder.accept(&row);
        }
        num_rows += 1;
    }

    let columns = builders
        .into_iter()
        .map(|(field_id, builder)| (field_id, builder.finalize_view()))
        .collect();
    debug!(root = %root, rows = num_rows, "query materialized");
    Ok(ColumnSet { columns, num_rows })
}

fn builder_for(
    tree: &FormTree,
    field_id: &str,
) -> Result<Option<Box<dyn ColumnBuilder>>, EngineError> {
    if field_id == ID_FIELD_ID {
        return create_builder(&FieldType::Text, FieldReader::Id);
    }
    let node_id = tree.find(field_id).ok_or_else(|| EngineError::FieldNotFound {
        class_id: tree.root_class().id.to_string(),
        field_id: field_id.to_string(),
    })?;
    let node = tree.node(node_id);
    let reader = match node.field_id().as_str() {
        CREATOR_FIELD_ID if node.intrinsic => FieldReader::Creator,
        COMMIT_TIME_FIELD_ID if node.intrinsic => FieldReader::CommitTime,
        _ => match embedded_path(tree, node_id) {
            Some(path) => FieldReader::Path(path),
            None => {
                debug!(field = field_id, "field lies behind a reference; no column");
                return Ok(None);
            }
        },
    };
    let column = create_builder(&node.field.field_type, reader)?;
    if column.is_none() {
        debug!(field = field_id, type_class = node.field.field_type.type_class(), "no column for field type");
    }
    Ok(column)
}

/// Record keys leading to the node, provided every ancestor is an embedded record.
fn embedded_path(tree: &FormTree, node_id: NodeId) -> Option<Vec<String>> {
    let mut current = tree.node(node_id).parent;
    while let Some(parent) = current {
        let node = tree.node(parent);
        if !matches!(node.field.field_type, FieldType::EmbeddedRecord { .. }) {
            return None;
        }
        current = node.parent;
    }
    Some(tree.path(node_id).iter().map(|f| f.to_string()).collect())
}
