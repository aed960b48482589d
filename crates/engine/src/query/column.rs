use chrono::NaiveDate;
use serde_json::Value as JsonValue;

/// Marks a boolean gap in a [`ColumnView::Boolean`] column.
pub const BOOLEAN_NA: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
}

/// An immutable, fixed-length column. Numeric gaps are NaN, boolean gaps
/// are [`BOOLEAN_NA`], string and date gaps are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnView {
    String(Box<[Option<String>]>),
    Number(Box<[f64]>),
    Boolean(Box<[i8]>),
    Date(Box<[Option<NaiveDate>]>),
}

impl ColumnView {
    pub fn len(&self) -> usize {
        match self {
            Self::String(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::String(_) => ColumnType::String,
            Self::Number(_) => ColumnType::Number,
            Self::Boolean(_) => ColumnType::Boolean,
            Self::Date(_) => ColumnType::Date,
        }
    }

    pub fn get_string(&self, row: usize) -> Option<&str> {
        match self {
            Self::String(v) => v.get(row).and_then(|s| s.as_deref()),
            _ => None,
        }
    }

    /// NaN for gaps, out-of-range rows and non-numeric columns.
    pub fn get_double(&self, row: usize) -> f64 {
        match self {
            Self::Number(v) => v.get(row).copied().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    pub fn get_boolean(&self, row: usize) -> Option<bool> {
        match self {
            Self::Boolean(v) => match v.get(row) {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_date(&self, row: usize) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::String(_) => self.get_string(row).is_none(),
            Self::Number(_) => self.get_double(row).is_nan(),
            Self::Boolean(_) => self.get_boolean(row).is_none(),
            Self::Date(_) => self.get_date(row).is_none(),
        }
    }

    pub(crate) fn json_value(&self, row: usize) -> Option<JsonValue> {
        match self {
            Self::String(_) => self.get_string(row).map(|s| JsonValue::String(s.to_string())),
            Self::Number(_) => serde_json::Number::from_f64(self.get_double(row)).map(JsonValue::Number),
            Self::Boolean(_) => self.get_boolean(row).map(JsonValue::Bool),
            Self::Date(_) => self
                .get_date(row)
                .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_read_as_missing() {
        let numbers = ColumnView::Number(vec![f64::NAN, 12.0].into_boxed_slice());
        assert!(numbers.is_missing(0));
        assert_eq!(numbers.get_double(1), 12.0);
        assert!(numbers.get_double(5).is_nan());

        let flags = ColumnView::Boolean(vec![1, 0, BOOLEAN_NA].into_boxed_slice());
        assert_eq!(flags.get_boolean(0), Some(true));
        assert_eq!(flags.get_boolean(1), Some(false));
        assert!(flags.is_missing(2));
        assert_eq!(flags.column_type(), ColumnType::Boolean);
    }

    #[test]
    fn json_omits_gaps() {
        let dates = ColumnView::Date(
            vec![NaiveDate::from_ymd_opt(2014, 7, 23), None].into_boxed_slice(),
        );
        assert_eq!(dates.json_value(0), Some(JsonValue::String("2014-07-23".into())));
        assert_eq!(dates.json_value(1), None);
        let numbers = ColumnView::Number(vec![f64::NAN].into_boxed_slice());
        assert_eq!(numbers.json_value(0), None);
    }
}
