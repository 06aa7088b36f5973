//! Raw SQLite values as found in the backup, before any interpretation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::intermediate::{Field, FieldError};

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Integer(_) => "integer",
            RawValue::Real(_) => "real",
            RawValue::Text(_) => "text",
            RawValue::Blob(_) => "blob",
        }
    }
}

/// Source-native primary key (or foreign key) of a row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Null,
    Integer(i64),
    Text(String),
}

impl From<&RawValue> for RowKey {
    fn from(value: &RawValue) -> Self {
        match value {
            RawValue::Null => RowKey::Null,
            RawValue::Integer(n) => RowKey::Integer(*n),
            RawValue::Real(r) => RowKey::Text(r.to_string()),
            RawValue::Text(s) => RowKey::Text(s.clone()),
            RawValue::Blob(b) => RowKey::Text(hex::encode(b)),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Null => f.write_str("NULL"),
            RowKey::Integer(n) => write!(f, "{n}"),
            RowKey::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowKey::Null => serializer.serialize_none(),
            RowKey::Integer(n) => serializer.serialize_i64(*n),
            RowKey::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One row of a source table. Never mutated after load.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub key: RowKey,
    columns: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new(key: RowKey, columns: BTreeMap<String, RawValue>) -> Self {
        Self { key, columns }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, column: &'static str) -> Field<&RawValue> {
        self.columns
            .get(column)
            .ok_or(FieldError::Missing { column })
    }

    pub fn text(&self, column: &'static str) -> Field<String> {
        match self.get(column)? {
            RawValue::Text(s) => Ok(s.clone()),
            RawValue::Null => Err(FieldError::Null { column }),
            other => Err(FieldError::WrongType {
                column,
                found: other.type_name(),
            }),
        }
    }

    /// Text column where NULL is a legitimate value.
    pub fn optional_text(&self, column: &'static str) -> Field<Option<String>> {
        match self.get(column)? {
            RawValue::Null => Ok(None),
            RawValue::Text(s) => Ok(Some(s.clone())),
            other => Err(FieldError::WrongType {
                column,
                found: other.type_name(),
            }),
        }
    }

    pub fn integer(&self, column: &'static str) -> Field<i64> {
        match self.get(column)? {
            RawValue::Integer(n) => Ok(*n),
            RawValue::Null => Err(FieldError::Null { column }),
            other => Err(FieldError::WrongType {
                column,
                found: other.type_name(),
            }),
        }
    }

    pub fn optional_integer(&self, column: &'static str) -> Field<Option<i64>> {
        match self.get(column)? {
            RawValue::Null => Ok(None),
            RawValue::Integer(n) => Ok(Some(*n)),
            other => Err(FieldError::WrongType {
                column,
                found: other.type_name(),
            }),
        }
    }

    /// Real column; SQLite stores integral reals as integers, so both are accepted.
    pub fn real(&self, column: &'static str) -> Field<f64> {
        match self.get(column)? {
            RawValue::Real(r) => Ok(*r),
            RawValue::Integer(n) => Ok(*n as f64),
            RawValue::Null => Err(FieldError::Null { column }),
            other => Err(FieldError::WrongType {
                column,
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(columns: &[(&str, RawValue)]) -> RawRow {
        RawRow::new(
            RowKey::Integer(1),
            columns
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn typed_accessors_report_what_they_found() {
        let r = row(&[
            ("name", RawValue::Text("team".into())),
            ("count", RawValue::Integer(4)),
            ("gone", RawValue::Null),
        ]);
        assert_eq!(r.text("name").unwrap(), "team");
        assert_eq!(r.real("count").unwrap(), 4.0);
        assert_eq!(r.optional_text("gone").unwrap(), None);
        assert_eq!(r.text("gone"), Err(FieldError::Null { column: "gone" }));
        assert_eq!(
            r.text("count"),
            Err(FieldError::WrongType {
                column: "count",
                found: "integer"
            })
        );
        assert_eq!(r.integer("absent"), Err(FieldError::Missing { column: "absent" }));
    }

    #[test]
    fn keys_from_values() {
        assert_eq!(RowKey::from(&RawValue::Integer(3)), RowKey::Integer(3));
        assert_eq!(
            RowKey::from(&RawValue::Blob(vec![0xde, 0xad])),
            RowKey::Text("dead".into())
        );
        assert_eq!(RowKey::from(&RawValue::Null).to_string(), "NULL");
    }
}
