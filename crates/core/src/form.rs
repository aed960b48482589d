//! Form schemas: a [`FormClass`] is a resource whose value describes the
//! fields other resources (its instances) carry.

use std::collections::{BTreeSet, HashSet};

use crate::error::CoreError;
use crate::field_value::{FieldValue, Record};
use crate::ids::{FieldId, ResourceId};
use crate::resource::Resource;

/// Class id of resources that are themselves form classes.
pub const FORM_CLASS_ID: &str = "_class";
pub const LABEL_FIELD_ID: &str = "_class_label";

pub const CREATOR_FIELD_ID: &str = "_creator";
pub const COMMIT_TIME_FIELD_ID: &str = "_commit_time";
/// Pseudo-field naming the instance id column.
pub const ID_FIELD_ID: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            _ => Err(CoreError::InvalidData(format!("unknown cardinality: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub id: ResourceId,
    pub label: String,
}

impl EnumItem {
    pub fn new(id: impl Into<ResourceId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// The closed set of field types a [`FormField`] may have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Quantity { units: Option<String> },
    Boolean,
    Enum {
        cardinality: Cardinality,
        items: Vec<EnumItem>,
    },
    /// Points at resources whose class is one of `range`.
    Reference {
        cardinality: Cardinality,
        range: BTreeSet<ResourceId>,
    },
    /// Embeds a record shaped by another form class.
    EmbeddedRecord { class_id: ResourceId },
    Barcode,
    GeoPoint,
    Image,
    Narrative,
    LocalDate,
    Month,
    Year,
    LocalDateInterval,
    Instant,
    Calculated { expression: String },
    Expr,
}

impl FieldType {
    pub fn type_class(&self) -> &'static str {
        match self {
            Self::Text => "FREE_TEXT",
            Self::Quantity { .. } => "QUANTITY",
            Self::Boolean => "BOOLEAN",
            Self::Enum { .. } => "enumerated",
            Self::Reference { .. } => "REFERENCE",
            Self::EmbeddedRecord { .. } => "record",
            Self::Barcode => "BARCODE",
            Self::GeoPoint => "geoPoint",
            Self::Image => "image",
            Self::Narrative => "NARRATIVE",
            Self::LocalDate => "LOCAL_DATE",
            Self::Month => "month",
            Self::Year => "year",
            Self::LocalDateInterval => "LOCAL_DATE_INTERVAL",
            Self::Instant => "instant",
            Self::Calculated { .. } => "calculated",
            Self::Expr => "expr",
        }
    }

    /// Form classes a resolver must descend into for this field.
    pub fn range(&self) -> BTreeSet<ResourceId> {
        match self {
            Self::Reference { range, .. } => range.clone(),
            Self::EmbeddedRecord { class_id } => BTreeSet::from([class_id.clone()]),
            _ => BTreeSet::new(),
        }
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new().with("typeClass", FieldValue::Text(self.type_class().into()));
        match self {
            Self::Quantity { units: Some(units) } => {
                record.set("units", FieldValue::Text(units.clone()));
            }
            Self::Enum { cardinality, items } => {
                record.set("cardinality", FieldValue::Text(cardinality.as_str().into()));
                let values = items
                    .iter()
                    .map(|item| {
                        FieldValue::Record(
                            Record::new()
                                .with("id", FieldValue::Text(item.id.to_string()))
                                .with("label", FieldValue::Text(item.label.clone())),
                        )
                    })
                    .collect();
                record.set("values", FieldValue::List(values));
            }
            Self::Reference { cardinality, range } => {
                record.set("cardinality", FieldValue::Text(cardinality.as_str().into()));
                record.set("range", FieldValue::Reference(range.iter().cloned().collect()));
            }
            Self::EmbeddedRecord { class_id } => {
                record.set("classId", FieldValue::Text(class_id.to_string()));
            }
            Self::Calculated { expression } => {
                record.set("expression", FieldValue::Expr(expression.clone()));
            }
            _ => {}
        }
        record
    }

    pub fn from_record(record: &Record) -> Result<Self, CoreError> {
        let type_class = record.require_text("typeClass")?;
        let cardinality = || match record.get_text("cardinality") {
            Some(s) => Cardinality::parse(s),
            None => Ok(Cardinality::Single),
        };
        let field_type = match type_class {
            "FREE_TEXT" => Self::Text,
            "QUANTITY" => Self::Quantity {
                units: record.get_text("units").map(str::to_string),
            },
            "BOOLEAN" => Self::Boolean,
            "enumerated" => {
                let mut items = Vec::new();
                for value in record.get_list("values").unwrap_or_default() {
                    let item = value.as_record().ok_or_else(|| {
                        CoreError::InvalidData("enum item is not a record".into())
                    })?;
                    items.push(EnumItem::new(
                        item.require_text("id")?,
                        item.require_text("label")?,
                    ));
                }
                Self::Enum {
                    cardinality: cardinality()?,
                    items,
                }
            }
            "REFERENCE" => {
                let range = match record.get("range") {
                    Some(FieldValue::Reference(ids)) => ids.iter().cloned().collect(),
                    None => BTreeSet::new(),
                    Some(other) => {
                        return Err(CoreError::InvalidData(format!(
                            "reference range must be a reference value, got {other:?}"
                        )));
                    }
                };
                Self::Reference {
                    cardinality: cardinality()?,
                    range,
                }
            }
            "record" => Self::EmbeddedRecord {
                class_id: ResourceId::new(record.require_text("classId")?),
            },
            "BARCODE" => Self::Barcode,
            "geoPoint" => Self::GeoPoint,
            "image" => Self::Image,
            "NARRATIVE" => Self::Narrative,
            "LOCAL_DATE" => Self::LocalDate,
            "month" => Self::Month,
            "year" => Self::Year,
            "LOCAL_DATE_INTERVAL" => Self::LocalDateInterval,
            "instant" => Self::Instant,
            "calculated" => match record.get("expression") {
                Some(FieldValue::Expr(expression)) | Some(FieldValue::Text(expression)) => {
                    Self::Calculated {
                        expression: expression.clone(),
                    }
                }
                _ => Self::Calculated {
                    expression: String::new(),
                },
            },
            "expr" => Self::Expr,
            other => {
                return Err(CoreError::InvalidData(format!("unknown field type: {other}")));
            }
        };
        Ok(field_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub id: FieldId,
    pub label: String,
    pub description: Option<String>,
    pub field_type: FieldType,
    pub required: bool,
    pub read_only: bool,
}

impl FormField {
    pub fn new(id: impl Into<FieldId>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            field_type,
            required: false,
            read_only: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", FieldValue::Text(self.id.to_string()))
            .with("label", FieldValue::Text(self.label.clone()))
            .with("type", FieldValue::Record(self.field_type.to_record()))
            .with("required", FieldValue::Boolean(self.required))
            .with("readOnly", FieldValue::Boolean(self.read_only));
        if let Some(description) = &self.description {
            record.set("description", FieldValue::Text(description.clone()));
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, CoreError> {
        Ok(Self {
            id: FieldId::new(record.require_text("id")?),
            label: record.get_text("label").unwrap_or_default().to_string(),
            description: record.get_text("description").map(str::to_string),
            field_type: FieldType::from_record(record.require_record("type")?)?,
            required: record.get_boolean("required").unwrap_or(false),
            read_only: record.get_boolean("readOnly").unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSection {
    pub id: FieldId,
    pub label: String,
    pub elements: Vec<FormElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormElement {
    Field(FormField),
    Section(FormSection),
}

impl FormElement {
    pub fn id(&self) -> &FieldId {
        match self {
            Self::Field(field) => &field.id,
            Self::Section(section) => &section.id,
        }
    }

    fn to_record(&self) -> FieldValue {
        match self {
            Self::Field(field) => FieldValue::Record(field.to_record()),
            Self::Section(section) => FieldValue::Record(
                Record::new()
                    .with("id", FieldValue::Text(section.id.to_string()))
                    .with("type", FieldValue::Text("section".into()))
                    .with("label", FieldValue::Text(section.label.clone()))
                    .with("elements", elements_to_list(&section.elements)),
            ),
        }
    }

    fn from_value(value: &FieldValue) -> Result<Self, CoreError> {
        let record = value
            .as_record()
            .ok_or_else(|| CoreError::InvalidData("form element is not a record".into()))?;
        if record.get_text("type") == Some("section") {
            Ok(Self::Section(FormSection {
                id: FieldId::new(record.require_text("id")?),
                label: record.get_text("label").unwrap_or_default().to_string(),
                elements: elements_from_list(record.get_list("elements").unwrap_or_default())?,
            }))
        } else {
            Ok(Self::Field(FormField::from_record(record)?))
        }
    }
}

fn elements_to_list(elements: &[FormElement]) -> FieldValue {
    FieldValue::List(elements.iter().map(FormElement::to_record).collect())
}

fn elements_from_list(values: &[FieldValue]) -> Result<Vec<FormElement>, CoreError> {
    values.iter().map(FormElement::from_value).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormClass {
    pub id: ResourceId,
    pub owner_id: ResourceId,
    pub label: String,
    pub description: Option<String>,
    pub elements: Vec<FormElement>,
}

impl FormClass {
    pub fn new(id: ResourceId, owner_id: ResourceId, label: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            label: label.into(),
            description: None,
            elements: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.elements.push(FormElement::Field(field));
        self
    }

    pub fn with_section(
        mut self,
        id: impl Into<FieldId>,
        label: impl Into<String>,
        elements: Vec<FormElement>,
    ) -> Self {
        self.elements.push(FormElement::Section(FormSection {
            id: id.into(),
            label: label.into(),
            elements,
        }));
        self
    }

    /// All fields, flattened through sections, in document order.
    pub fn fields(&self) -> Vec<&FormField> {
        fn collect<'a>(elements: &'a [FormElement], out: &mut Vec<&'a FormField>) {
            for element in elements {
                match element {
                    FormElement::Field(field) => out.push(field),
                    FormElement::Section(section) => collect(&section.elements, out),
                }
            }
        }
        let mut fields = Vec::new();
        collect(&self.elements, &mut fields);
        fields
    }

    pub fn field(&self, field_id: &FieldId) -> Option<&FormField> {
        self.fields().into_iter().find(|f| &f.id == field_id)
    }

    /// Returns a copy with the element (field or section) removed wherever it is nested.
    pub fn without_element(&self, element_id: &FieldId) -> FormClass {
        fn rebuild(elements: &[FormElement], element_id: &FieldId) -> Vec<FormElement> {
            elements
                .iter()
                .filter(|e| e.id() != element_id)
                .map(|e| match e {
                    FormElement::Section(section) => FormElement::Section(FormSection {
                        id: section.id.clone(),
                        label: section.label.clone(),
                        elements: rebuild(&section.elements, element_id),
                    }),
                    field => field.clone(),
                })
                .collect()
        }
        FormClass {
            elements: rebuild(&self.elements, element_id),
            ..self.clone()
        }
    }

    /// Field ids must be unique across the flattened field list.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for field in self.fields() {
            if !seen.insert(&field.id) {
                return Err(CoreError::DuplicateField {
                    class_id: self.id.to_string(),
                    field_id: field.id.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn as_resource(&self) -> Resource {
        let mut value = Record::new()
            .with(LABEL_FIELD_ID, FieldValue::Text(self.label.clone()))
            .with("elements", elements_to_list(&self.elements));
        if let Some(description) = &self.description {
            value.set("description", FieldValue::Text(description.clone()));
        }
        Resource::new(
            self.id.clone(),
            self.owner_id.clone(),
            ResourceId::new(FORM_CLASS_ID),
            value,
        )
    }

    pub fn from_resource(resource: &Resource) -> Result<Self, CoreError> {
        if resource.class_id.as_str() != FORM_CLASS_ID {
            return Err(CoreError::InvalidData(format!(
                "resource {} is of class {}, not a form class",
                resource.id, resource.class_id
            )));
        }
        Ok(Self {
            id: resource.id.clone(),
            owner_id: resource.owner_id.clone(),
            label: resource.value.get_text(LABEL_FIELD_ID).unwrap_or_default().to_string(),
            description: resource.value.get_text("description").map(str::to_string),
            elements: elements_from_list(resource.value.get_list("elements").unwrap_or_default())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_class() -> FormClass {
        FormClass::new(ResourceId::new("site"), ResourceId::new("db1"), "Site")
            .with_field(FormField::new("name", "Name", FieldType::Text).required())
            .with_section(
                "s1",
                "Indicators",
                vec![
                    FormElement::Field(FormField::new(
                        "beneficiaries",
                        "Beneficiaries",
                        FieldType::Quantity {
                            units: Some("people".into()),
                        },
                    )),
                    FormElement::Field(FormField::new(
                        "status",
                        "Status",
                        FieldType::Enum {
                            cardinality: Cardinality::Single,
                            items: vec![EnumItem::new("open", "Open"), EnumItem::new("closed", "Closed")],
                        },
                    )),
                ],
            )
            .with_field(FormField::new(
                "province",
                "Province",
                FieldType::Reference {
                    cardinality: Cardinality::Single,
                    range: BTreeSet::from([ResourceId::new("province")]),
                },
            ))
            .with_field(FormField::new(
                "total",
                "Total",
                FieldType::Calculated {
                    expression: "beneficiaries * 2".into(),
                },
            ))
    }

    #[test]
    fn fields_flatten_sections_in_order() {
        let ids: Vec<_> = site_class().fields().iter().map(|f| f.id.to_string()).collect();
        assert_eq!(ids, vec!["name", "beneficiaries", "status", "province", "total"]);
    }

    #[test]
    fn resource_roundtrip_preserves_schema() {
        let class = site_class();
        let resource = class.as_resource();
        assert_eq!(resource.class_id.as_str(), FORM_CLASS_ID);
        let restored = FormClass::from_resource(&resource).unwrap();
        assert_eq!(restored, class);
    }

    #[test]
    fn without_element_removes_nested_field() {
        let class = site_class();
        let edited = class.without_element(&FieldId::new("status"));
        assert!(edited.field(&FieldId::new("status")).is_none());
        assert!(edited.field(&FieldId::new("beneficiaries")).is_some());
        // the original is untouched
        assert!(class.field(&FieldId::new("status")).is_some());
    }

    #[test]
    fn duplicate_field_ids_rejected() {
        let class = site_class().with_section(
            "s2",
            "Again",
            vec![FormElement::Field(FormField::new("name", "Name 2", FieldType::Text))],
        );
        match class.validate() {
            Err(CoreError::DuplicateField { field_id, .. }) => assert_eq!(field_id, "name"),
            other => panic!("expected DuplicateField, got {other:?}"),
        }
        assert!(site_class().validate().is_ok());
    }

    #[test]
    fn range_covers_reference_and_embedded_types() {
        let reference = FieldType::Reference {
            cardinality: Cardinality::Multiple,
            range: BTreeSet::from([ResourceId::new("a"), ResourceId::new("b")]),
        };
        assert_eq!(reference.range().len(), 2);
        let embedded = FieldType::EmbeddedRecord {
            class_id: ResourceId::new("address"),
        };
        assert_eq!(embedded.range(), BTreeSet::from([ResourceId::new("address")]));
        assert!(FieldType::Text.range().is_empty());
    }

    #[test]
    fn non_form_resource_rejected() {
        let resource = Resource::new(
            ResourceId::new("x"),
            ResourceId::root(),
            ResourceId::new("site"),
            Record::new(),
        );
        assert!(matches!(
            FormClass::from_resource(&resource),
            Err(CoreError::InvalidData(_))
        ));
    }
}
