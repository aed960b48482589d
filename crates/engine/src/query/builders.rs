use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use formstore_core::expr::{ExprNode, Value};
use formstore_core::form::{Cardinality, EnumItem};
use formstore_core::{FieldValue, PrincipalId, Record, ResourceId};

use super::column::{BOOLEAN_NA, ColumnView};

/// One admitted instance as seen by the builders.
pub struct InstanceRow<'a> {
    pub id: &'a ResourceId,
    pub value: &'a Record,
    pub created_by: &'a PrincipalId,
    pub created_at: DateTime<Utc>,
}

/// Where a builder takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldReader {
    Id,
    Creator,
    CommitTime,
    /// Field key, preceded by the keys of any enclosing embedded records.
    Path(Vec<String>),
}

impl FieldReader {
    pub fn read(&self, row: &InstanceRow) -> Option<FieldValue> {
        match self {
            Self::Id => Some(FieldValue::Text(row.id.to_string())),
            Self::Creator => Some(FieldValue::Text(row.created_by.to_string())),
            Self::CommitTime => Some(FieldValue::Instant(row.created_at)),
            Self::Path(path) => {
                let (last, _) = path.split_last()?;
                self.scope(row)?.get(last).cloned()
            }
        }
    }

    /// The record holding the field: the instance itself, or an embedded record.
    pub fn scope<'r>(&self, row: &InstanceRow<'r>) -> Option<&'r Record> {
        let mut record = row.value;
        if let Self::Path(path) = self {
            let (_, parents) = path.split_last()?;
            for key in parents {
                record = record.get_record(key)?;
            }
        }
        Some(record)
    }
}

/// Appends exactly one value or gap per accepted instance, then yields an
/// immutable column.
pub trait ColumnBuilder {
    fn accept(&mut self, row: &InstanceRow);
    fn finalize_view(self: Box<Self>) -> ColumnView;
}

pub struct StringColumnBuilder {
    reader: FieldReader,
    values: Vec<Option<String>>,
}

impl StringColumnBuilder {
    pub fn new(reader: FieldReader) -> Self {
        Self {
            reader,
            values: Vec::new(),
        }
    }
}

impl ColumnBuilder for StringColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = match self.reader.read(row) {
            Some(FieldValue::Text(s)) | Some(FieldValue::Barcode(s)) => Some(s),
            _ => None,
        };
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        ColumnView::String(self.values.into_boxed_slice())
    }
}

pub struct DoubleColumnBuilder {
    reader: FieldReader,
    extract: fn(&FieldValue) -> Option<f64>,
    values: Vec<f64>,
}

impl DoubleColumnBuilder {
    pub fn quantity(reader: FieldReader) -> Self {
        Self::new(reader, |v| match v {
            FieldValue::Quantity { value, .. } => Some(*value),
            _ => None,
        })
    }

    pub fn year(reader: FieldReader) -> Self {
        Self::new(reader, |v| match v {
            FieldValue::Year(year) => Some(f64::from(*year)),
            _ => None,
        })
    }

    fn new(reader: FieldReader, extract: fn(&FieldValue) -> Option<f64>) -> Self {
        Self {
            reader,
            extract,
            values: Vec::new(),
        }
    }
}

impl ColumnBuilder for DoubleColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = self
            .reader
            .read(row)
            .and_then(|v| (self.extract)(&v))
            .unwrap_or(f64::NAN);
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        ColumnView::Number(self.values.into_boxed_slice())
    }
}

pub struct BooleanColumnBuilder {
    reader: FieldReader,
    values: Vec<i8>,
}

impl BooleanColumnBuilder {
    pub fn new(reader: FieldReader) -> Self {
        Self {
            reader,
            values: Vec::new(),
        }
    }
}

impl ColumnBuilder for BooleanColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = match self.reader.read(row) {
            Some(FieldValue::Boolean(b)) => i8::from(b),
            _ => BOOLEAN_NA,
        };
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        ColumnView::Boolean(self.values.into_boxed_slice())
    }
}

/// Renders selected enum items by label. Multiple selections are joined
/// with `", "` in item order.
pub struct EnumColumnBuilder {
    reader: FieldReader,
    cardinality: Cardinality,
    items: Vec<EnumItem>,
    index: HashMap<ResourceId, usize>,
    values: Vec<Option<String>>,
}

impl EnumColumnBuilder {
    pub fn new(reader: FieldReader, cardinality: Cardinality, items: Vec<EnumItem>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        Self {
            reader,
            cardinality,
            items,
            index,
            values: Vec::new(),
        }
    }

    fn labels(&self, selected: &[ResourceId]) -> Option<String> {
        let mut positions: Vec<usize> = selected
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        positions.sort_unstable();
        positions.dedup();
        match self.cardinality {
            Cardinality::Single => positions.first().map(|&i| self.items[i].label.clone()),
            Cardinality::Multiple if positions.is_empty() => None,
            Cardinality::Multiple => Some(
                positions
                    .iter()
                    .map(|&i| self.items[i].label.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }
}

impl ColumnBuilder for EnumColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = match self.reader.read(row) {
            Some(FieldValue::Enum(selected)) => self.labels(&selected),
            _ => None,
        };
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        ColumnView::String(self.values.into_boxed_slice())
    }
}

/// Instants are reduced to their UTC calendar date.
pub struct DateColumnBuilder {
    reader: FieldReader,
    values: Vec<Option<NaiveDate>>,
}

impl DateColumnBuilder {
    pub fn new(reader: FieldReader) -> Self {
        Self {
            reader,
            values: Vec::new(),
        }
    }
}

impl ColumnBuilder for DateColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = match self.reader.read(row) {
            Some(FieldValue::Instant(t)) => Some(t.date_naive()),
            Some(FieldValue::LocalDate(d)) => Some(d),
            _ => None,
        };
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        ColumnView::Date(self.values.into_boxed_slice())
    }
}

/// Evaluates a parsed expression per instance. The column type follows the
/// first non-missing result; rows of any other type become gaps.
pub struct CalcColumnBuilder {
    reader: FieldReader,
    expr: ExprNode,
    values: Vec<Value>,
}

impl CalcColumnBuilder {
    pub fn new(reader: FieldReader, expr: ExprNode) -> Self {
        Self {
            reader,
            expr,
            values: Vec::new(),
        }
    }
}

impl ColumnBuilder for CalcColumnBuilder {
    fn accept(&mut self, row: &InstanceRow) {
        let value = match self.reader.scope(row) {
            Some(scope) => match self.expr.evaluate(scope) {
                Ok(value) => value,
                Err(err) => {
                    debug!(resource_id = %row.id, expr = %self.expr, error = %err, "calculation failed");
                    Value::Missing
                }
            },
            None => Value::Missing,
        };
        self.values.push(value);
    }

    fn finalize_view(self: Box<Self>) -> ColumnView {
        let first = self.values.iter().find(|v| !matches!(v, Value::Missing));
        match first {
            Some(Value::Text(_)) => ColumnView::String(
                self.values
                    .into_iter()
                    .map(|v| match v {
                        Value::Text(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(Value::Boolean(_)) => ColumnView::Boolean(
                self.values
                    .into_iter()
                    .map(|v| match v {
                        Value::Boolean(b) => i8::from(b),
                        _ => BOOLEAN_NA,
                    })
                    .collect(),
            ),
            _ => ColumnView::Number(
                self.values
                    .into_iter()
                    .map(|v| match v {
                        Value::Number(n) => n,
                        _ => f64::NAN,
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use formstore_core::expr;

    use super::*;

    fn accept_all(mut builder: Box<dyn ColumnBuilder>, records: &[Record]) -> ColumnView {
        let id = ResourceId::new("r");
        let creator = ResourceId::new("u1");
        for record in records {
            builder.accept(&InstanceRow {
                id: &id,
                value: record,
                created_by: &creator,
                created_at: Utc::now(),
            });
        }
        builder.finalize_view()
    }

    fn path(key: &str) -> FieldReader {
        FieldReader::Path(key.split('.').map(str::to_string).collect())
    }

    #[test]
    fn quantity_gaps_are_nan() {
        let records = [
            Record::new(),
            Record::new().with("q", FieldValue::quantity(12.0)),
            Record::new().with("q", FieldValue::Text("12".into())),
        ];
        let view = accept_all(Box::new(DoubleColumnBuilder::quantity(path("q"))), &records);
        assert_eq!(view.len(), 3);
        assert!(view.get_double(0).is_nan());
        assert_eq!(view.get_double(1), 12.0);
        assert!(view.get_double(2).is_nan());
    }

    #[test]
    fn enum_labels_by_cardinality() {
        let items = vec![
            EnumItem::new("a", "Alpha"),
            EnumItem::new("b", "Beta"),
            EnumItem::new("c", "Gamma"),
        ];
        let selected = FieldValue::Enum(vec![ResourceId::new("c"), ResourceId::new("a")]);
        let records = [Record::new().with("e", selected), Record::new()];

        let multi = accept_all(
            Box::new(EnumColumnBuilder::new(path("e"), Cardinality::Multiple, items.clone())),
            &records,
        );
        assert_eq!(multi.get_string(0), Some("Alpha, Gamma"));
        assert_eq!(multi.get_string(1), None);

        let single = accept_all(
            Box::new(EnumColumnBuilder::new(path("e"), Cardinality::Single, items)),
            &records,
        );
        assert_eq!(single.get_string(0), Some("Alpha"));
    }

    #[test]
    fn embedded_paths_reach_nested_records() {
        let records = [Record::new().with(
            "address",
            FieldValue::Record(Record::new().with("city", FieldValue::Text("Goma".into()))),
        )];
        let view = accept_all(Box::new(StringColumnBuilder::new(path("address.city"))), &records);
        assert_eq!(view.get_string(0), Some("Goma"));
    }

    #[test]
    fn calculated_column_takes_type_of_results() {
        let records = [
            Record::new().with("q", FieldValue::quantity(2.0)),
            Record::new(),
            Record::new().with("q", FieldValue::Text("x".into())),
        ];
        let node = expr::parse("q * 2").unwrap();
        let view = accept_all(Box::new(CalcColumnBuilder::new(path("total"), node)), &records);
        assert_eq!(view.get_double(0), 4.0);
        assert!(view.get_double(1).is_nan());
        // evaluation error becomes a gap
        assert!(view.get_double(2).is_nan());

        let node = expr::parse("q == 2").unwrap();
        let view = accept_all(Box::new(CalcColumnBuilder::new(path("flag"), node)), &records);
        assert_eq!(view.get_boolean(0), Some(true));
        assert_eq!(view.get_boolean(1), Some(false));
        assert_eq!(view.get_boolean(2), None);
    }

    #[test]
    fn intrinsic_readers() {
        let records = [Record::new()];
        let creator = accept_all(Box::new(StringColumnBuilder::new(FieldReader::Creator)), &records);
        assert_eq!(creator.get_string(0), Some("u1"));
        let ids = accept_all(Box::new(StringColumnBuilder::new(FieldReader::Id)), &records);
        assert_eq!(ids.get_string(0), Some("r"));
        let time = accept_all(Box::new(DateColumnBuilder::new(FieldReader::CommitTime)), &records);
        assert_eq!(time.get_date(0), Some(Utc::now().date_naive()));
    }
}
