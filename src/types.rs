//! Core data model types for uploads.
//!
//! An upload moves an in-memory [`DataSet`] into a database table. The dataset is described by a
//! [`Schema`] (a list of typed [`Field`]s) and stores its cells as typed [`Value`]s.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::error::{UploadError, UploadResult};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// Decimal number, carried as a 64-bit float and serialized to four places.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Date and time without a time zone.
    DateTime,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a dataset (and of the target table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Date and time without a time zone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "integer",
            Value::Float64(_) => "decimal",
            Value::Bool(_) => "bool",
            Value::Utf8(_) => "text",
            Value::DateTime(_) => "date-time",
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields. Uploads share
/// a dataset behind an `Arc` and never mutate it; every formatted representation is a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows without checking its shape.
    ///
    /// Use [`DataSet::try_new`] (or call [`DataSet::validate`]) to check the invariants up front;
    /// uploads validate before doing any I/O either way.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Create a dataset, rejecting duplicate column names and ragged rows.
    pub fn try_new(schema: Schema, rows: Vec<Vec<Value>>) -> UploadResult<Self> {
        let ds = Self { schema, rows };
        ds.validate()?;
        Ok(ds)
    }

    /// Check that column names are unique and every row has one value per field.
    pub fn validate(&self) -> UploadResult<()> {
        if self.schema.is_empty() {
            return Err(UploadError::InvalidDataset {
                message: "dataset has no columns".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(self.schema.len());
        for name in self.schema.field_names() {
            if !seen.insert(name) {
                return Err(UploadError::InvalidDataset {
                    message: format!("duplicate column name '{name}'"),
                });
            }
        }

        let expected_len = self.schema.len();
        if let Some((idx, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != expected_len)
        {
            return Err(UploadError::InvalidDataset {
                message: format!(
                    "row {idx} has {} values but the schema has {expected_len} columns",
                    row.len()
                ),
            });
        }
        Ok(())
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the dataset.
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Iterate the values of one column in row order.
    ///
    /// Returns `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }
}
