use formstore_core::FieldType;
use formstore_core::expr;

use super::builders::{
    BooleanColumnBuilder, CalcColumnBuilder, ColumnBuilder, DateColumnBuilder,
    DoubleColumnBuilder, EnumColumnBuilder, FieldReader, StringColumnBuilder,
};
use crate::error::EngineError;

/// Picks the builder for a field type. Types without a tabular
/// representation get `None` rather than an error.
pub fn create_builder(
    field_type: &FieldType,
    reader: FieldReader,
) -> Result<Option<Box<dyn ColumnBuilder>>, EngineError> {
    let builder: Box<dyn ColumnBuilder> = match field_type {
        FieldType::Text | FieldType::Barcode => Box::new(StringColumnBuilder::new(reader)),
        FieldType::Quantity { .. } => Box::new(DoubleColumnBuilder::quantity(reader)),
        FieldType::Year => Box::new(DoubleColumnBuilder::year(reader)),
        FieldType::Boolean => Box::new(BooleanColumnBuilder::new(reader)),
        FieldType::Enum { cardinality, items } => {
            Box::new(EnumColumnBuilder::new(reader, *cardinality, items.clone()))
        }
        FieldType::Instant => Box::new(DateColumnBuilder::new(reader)),
        FieldType::Calculated { expression } => {
            Box::new(CalcColumnBuilder::new(reader, expr::parse(expression)?))
        }
        FieldType::Reference { .. }
        | FieldType::EmbeddedRecord { .. }
        | FieldType::GeoPoint
        | FieldType::Image
        | FieldType::LocalDateInterval
        | FieldType::Narrative
        | FieldType::Month
        | FieldType::LocalDate
        | FieldType::Expr => return Ok(None),
    };
    Ok(Some(builder))
}
