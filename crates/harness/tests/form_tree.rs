use std::collections::BTreeSet;

use formstore_core::form::{Cardinality, COMMIT_TIME_FIELD_ID, CREATOR_FIELD_ID};
use formstore_core::{FieldType, FormClass, FormElement, FormField, ResourceId};
use formstore_engine::EngineError;
use formstore_harness::{TestWorkspace, init_tracing};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn reference_to(id: &str, target: &ResourceId) -> FormField {
    FormField::new(
        id,
        id,
        FieldType::Reference {
            cardinality: Cardinality::Single,
            range: BTreeSet::from([target.clone()]),
        },
    )
}

fn embedding(id: &str, target: &ResourceId) -> FormField {
    FormField::new(
        id,
        id,
        FieldType::EmbeddedRecord {
            class_id: target.clone(),
        },
    )
}

#[test]
fn referenced_forms_are_expanded_under_their_field() -> TestResult {
    init_tracing();
    let mut ws = TestWorkspace::new()?;
    let village = ws.create_form("Village", vec![FormField::new("vname", "Name", FieldType::Text)])?;
    let household = ws.create_form(
        "Household",
        vec![
            FormField::new("head", "Head", FieldType::Text),
            reference_to("village", &village.id),
        ],
    )?;

    let tree = ws.workspace.form_tree(&ws.owner, &household.id)?;
    let roots: Vec<&str> = tree.root_fields().map(|n| n.field_id().as_str()).collect();
    assert_eq!(roots, vec![CREATOR_FIELD_ID, COMMIT_TIME_FIELD_ID, "head", "village"]);

    let village_node = tree.find("village").ok_or("village not in tree")?;
    assert!(tree.node(village_node).is_reference());
    let nested = tree.find("village.vname").ok_or("vname not in tree")?;
    assert_eq!(tree.node(nested).defining_class, village.id);
    assert_eq!(tree.path(nested).len(), 2);
    Ok(())
}

#[test]
fn self_references_stay_leaves() -> TestResult {
    let mut ws = TestWorkspace::new()?;
    let person = ws.create_form("Person", vec![FormField::new("name", "Name", FieldType::Text)])?;
    let mother = reference_to("mother", &person.id);
    let person = person.with_field(mother);
    ws.workspace.put_form_class(&ws.owner, &person)?;

    let tree = ws.workspace.form_tree(&ws.owner, &person.id)?;
    let mother = tree.find("mother").ok_or("mother not in tree")?;
    assert_eq!(tree.children(mother).count(), 0);
    assert_eq!(tree.len(), 4);
    Ok(())
}

#[test]
fn embedded_cycles_are_rejected() -> TestResult {
    let mut ws = TestWorkspace::new()?;
    let a = ws.create_form("A", vec![])?;
    let b = ws.create_form("B", vec![embedding("a", &a.id)])?;
    let a = a.with_field(embedding("b", &b.id));
    ws.workspace.put_form_class(&ws.owner, &a)?;

    assert!(matches!(
        ws.workspace.form_tree(&ws.owner, &a.id),
        Err(EngineError::CyclicSchema(_))
    ));
    Ok(())
}

#[test]
fn dangling_references_are_consistency_errors() -> TestResult {
    let mut ws = TestWorkspace::new()?;
    let form = ws.create_form("Broken", vec![reference_to("ghost", &ResourceId::new("no-such-form"))])?;
    assert!(matches!(
        ws.workspace.form_tree(&ws.owner, &form.id),
        Err(EngineError::Consistency(_))
    ));
    Ok(())
}

#[test]
fn tree_requires_view_and_a_live_form() -> TestResult {
    let mut ws = TestWorkspace::new()?;
    let form = ws.create_form("Survey", vec![FormField::new("q", "Q", FieldType::Text)])?;
    assert!(matches!(
        ws.workspace.form_tree(&ResourceId::new("stranger"), &form.id),
        Err(EngineError::Unauthorized { .. })
    ));

    ws.workspace.delete_resource(&ws.owner, &form.id)?;
    assert!(matches!(
        ws.workspace.form_tree(&ws.owner, &form.id),
        Err(EngineError::ResourceDeleted(_))
    ));
    Ok(())
}

#[test]
fn sections_contribute_their_fields() -> TestResult {
    let mut ws = TestWorkspace::new()?;
    let form = FormClass::new(ResourceId::generate(), ws.folder.clone(), "Sectioned")
        .with_field(FormField::new("intro", "Intro", FieldType::Text))
        .with_section(
            "details",
            "Details",
            vec![FormElement::Field(FormField::new(
                "age",
                "Age",
                FieldType::Quantity { units: Some("years".into()) },
            ))],
        );
    ws.workspace.put_form_class(&ws.owner, &form)?;

    let tree = ws.workspace.form_tree(&ws.owner, &form.id)?;
    assert!(tree.find("age").is_some());
    assert!(tree.find("details").is_none());
    Ok(())
}
