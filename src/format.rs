//! Value formatting for the load strategies.
//!
//! Each strategy needs the dataset in a different shape:
//!
//! - [`format_native`]: type-checked [`Value`]s handed to the driver's multi-row insert
//! - [`format_statement`]: [`Literal`] tokens for generated `INSERT ... VALUES` batches
//! - [`format_delimited`]: plain text fields for the bulk-load staging file
//!
//! Formatting never touches the source [`DataSet`]; every function returns a new copy. Rows are
//! formatted in parallel chunks.
//!
//! Serialization rules shared by the textual modes:
//!
//! - decimals use four places (`10.5` -> `10.5000`), `NaN` becomes null
//! - integers are plain digits, booleans `1`/`0`
//! - date-times use `YYYY-MM-DD HH:MM:SS`

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;

use crate::error::{UploadError, UploadResult};
use crate::types::{DataSet, DataType, Field, Value};

/// Rows per rayon work item.
const FORMAT_CHUNK_ROWS: usize = 2_048;

/// `strftime` pattern used for every serialized date-time.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The representation a strategy asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Native typed values.
    Native,
    /// Tokens for a generated SQL statement.
    Statement,
    /// Fields of a delimiter-separated file.
    Delimited {
        /// Field separator byte.
        delimiter: u8,
    },
}

/// A statement token produced by [`format_statement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// SQL `null`.
    Null,
    /// Unquoted numeric text.
    Number(String),
    /// Text that is single-quoted when inlined. Never contains `'`.
    Quoted(String),
}

impl Literal {
    /// Render the token for inline inclusion in a statement.
    pub fn to_sql(&self) -> Cow<'_, str> {
        match self {
            Literal::Null => Cow::Borrowed("null"),
            Literal::Number(s) => Cow::Borrowed(s.as_str()),
            Literal::Quoted(s) => Cow::Owned(format!("'{s}'")),
        }
    }

    /// The value bound for this token in parameterized execution.
    pub fn to_param(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Number(s) | Literal::Quoted(s) => Value::Utf8(s.clone()),
        }
    }
}

/// One formatted cell, as returned by [`format_column`].
#[derive(Debug, Clone, PartialEq)]
pub enum Formatted {
    /// [`FormatMode::Native`] output.
    Native(Value),
    /// [`FormatMode::Statement`] output.
    Literal(Literal),
    /// [`FormatMode::Delimited`] output.
    Field(String),
}

/// Type-check and normalize every value for driver-native insertion.
pub fn format_native(dataset: &DataSet) -> UploadResult<Vec<Vec<Value>>> {
    format_rows(dataset, |cell| Ok(cell.into_native()))
}

/// Format every value into a statement token.
pub fn format_statement(dataset: &DataSet) -> UploadResult<Vec<Vec<Literal>>> {
    format_rows(dataset, |cell| Ok(cell.into_literal()))
}

/// Format every value into a delimited-text field. Null becomes the empty field.
pub fn format_delimited(dataset: &DataSet, delimiter: u8) -> UploadResult<Vec<Vec<String>>> {
    format_rows(dataset, |cell| Ok(cell.into_field(delimiter)))
}

/// Format a single column, in row order.
pub fn format_column(dataset: &DataSet, column: &str, mode: FormatMode) -> UploadResult<Vec<Formatted>> {
    let idx = dataset
        .schema
        .index_of(column)
        .ok_or_else(|| UploadError::InvalidOptions {
            message: format!("unknown column '{column}'"),
        })?;
    let field = &dataset.schema.fields[idx];

    dataset
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let cell = coerce(field, &row[idx], row_idx)?;
            Ok(match mode {
                FormatMode::Native => Formatted::Native(cell.into_native()),
                FormatMode::Statement => Formatted::Literal(cell.into_literal()),
                FormatMode::Delimited { delimiter } => Formatted::Field(cell.into_field(delimiter)),
            })
        })
        .collect()
}

/// Suggested width per text column: `ceil(1.5 * longest value)`, at least 1.
///
/// Non-text columns get `None`.
pub fn text_widths(dataset: &DataSet) -> Vec<Option<usize>> {
    dataset
        .schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            if field.data_type != DataType::Utf8 {
                return None;
            }
            let longest = dataset
                .rows
                .iter()
                .filter_map(|row| match &row[idx] {
                    Value::Utf8(s) => Some(s.chars().count()),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Some((longest * 3).div_ceil(2).max(1))
        })
        .collect()
}

/// Legacy text rule for statement tokens: drop single quotes, space out colons.
pub fn statement_text(raw: &str) -> String {
    raw.replace('\'', "").replace(':', ": ")
}

/// Lossy text rule for staging files: drop characters that would break the row layout.
pub fn delimited_text(raw: &str, delimiter: u8) -> String {
    let delimiter = char::from(delimiter);
    raw.chars()
        .filter(|c| !matches!(c, ',' | '&' | '"' | '\'' | '\r' | '\n') && *c != delimiter)
        .collect()
}

fn format_rows<T, F>(dataset: &DataSet, render: F) -> UploadResult<Vec<Vec<T>>>
where
    T: Send,
    F: Fn(Cell<'_>) -> UploadResult<T> + Sync,
{
    let fields = &dataset.schema.fields;
    let per_chunk: Vec<Vec<Vec<T>>> = dataset
        .rows
        .par_chunks(FORMAT_CHUNK_ROWS)
        .enumerate()
        .map(|(chunk_idx, rows)| {
            let base = chunk_idx * FORMAT_CHUNK_ROWS;
            rows.iter()
                .enumerate()
                .map(|(offset, row)| {
                    fields
                        .iter()
                        .zip(row)
                        .map(|(field, value)| render(coerce(field, value, base + offset)?))
                        .collect::<UploadResult<Vec<T>>>()
                })
                .collect::<UploadResult<Vec<Vec<T>>>>()
        })
        .collect::<UploadResult<Vec<_>>>()?;

    Ok(per_chunk.into_iter().flatten().collect())
}

/// A value normalized to its column's declared type.
#[derive(Debug)]
enum Cell<'a> {
    Null,
    Int(i64),
    Decimal(f64),
    Bool(bool),
    Text(Cow<'a, str>),
    DateTime(NaiveDateTime),
}

impl Cell<'_> {
    fn into_native(self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Int(v) => Value::Int64(v),
            Cell::Decimal(v) => Value::Float64(v),
            Cell::Bool(v) => Value::Bool(v),
            Cell::Text(s) => Value::Utf8(s.into_owned()),
            Cell::DateTime(v) => Value::DateTime(v),
        }
    }

    fn into_literal(self) -> Literal {
        match self {
            Cell::Null => Literal::Null,
            Cell::Int(v) => Literal::Number(v.to_string()),
            Cell::Decimal(v) => Literal::Number(format!("{v:.4}")),
            Cell::Bool(v) => Literal::Number((if v { "1" } else { "0" }).to_string()),
            Cell::Text(s) => Literal::Quoted(statement_text(&s)),
            Cell::DateTime(v) => Literal::Quoted(v.format(DATETIME_FORMAT).to_string()),
        }
    }

    fn into_field(self, delimiter: u8) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Int(v) => v.to_string(),
            Cell::Decimal(v) => format!("{v:.4}"),
            Cell::Bool(v) => (if v { "1" } else { "0" }).to_string(),
            Cell::Text(s) => delimited_text(&s, delimiter),
            Cell::DateTime(v) => v.format(DATETIME_FORMAT).to_string(),
        }
    }
}

fn coerce<'a>(field: &Field, value: &'a Value, row: usize) -> UploadResult<Cell<'a>> {
    let mismatch = |message: String| UploadError::Formatting {
        row,
        column: field.name.clone(),
        message,
    };
    let unsupported = || mismatch(format!("{} value in {:?} column", value.kind_name(), field.data_type));

    if value.is_null() {
        return Ok(Cell::Null);
    }

    match field.data_type {
        DataType::Int64 => match value {
            Value::Int64(v) => Ok(Cell::Int(*v)),
            Value::Utf8(s) => s
                .trim()
                .parse::<i64>()
                .map(Cell::Int)
                .map_err(|e| mismatch(format!("'{s}' is not an integer: {e}"))),
            _ => Err(unsupported()),
        },
        DataType::Float64 => {
            let v = match value {
                Value::Float64(v) => *v,
                Value::Int64(v) => *v as f64,
                Value::Utf8(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| mismatch(format!("'{s}' is not a decimal: {e}")))?,
                _ => return Err(unsupported()),
            };
            if v.is_nan() {
                Ok(Cell::Null)
            } else if v.is_infinite() {
                Err(mismatch(format!("{v} cannot be stored as a decimal")))
            } else {
                Ok(Cell::Decimal(v))
            }
        }
        DataType::Bool => match value {
            Value::Bool(v) => Ok(Cell::Bool(*v)),
            Value::Int64(0) => Ok(Cell::Bool(false)),
            Value::Int64(1) => Ok(Cell::Bool(true)),
            _ => Err(unsupported()),
        },
        DataType::Utf8 => Ok(match value {
            Value::Utf8(s) => Cell::Text(Cow::Borrowed(s.as_str())),
            Value::Int64(v) => Cell::Text(Cow::Owned(v.to_string())),
            Value::Float64(v) if v.is_nan() => Cell::Null,
            Value::Float64(v) => Cell::Text(Cow::Owned(v.to_string())),
            Value::Bool(v) => Cell::Text(Cow::Owned(v.to_string())),
            Value::DateTime(v) => Cell::Text(Cow::Owned(v.format(DATETIME_FORMAT).to_string())),
            Value::Null => Cell::Null,
        }),
        DataType::DateTime => match value {
            Value::DateTime(v) => Ok(Cell::DateTime(*v)),
            Value::Utf8(s) => parse_datetime(s.trim())
                .map(Cell::DateTime)
                .ok_or_else(|| mismatch(format!("'{s}' is not a date-time"))),
            _ => Err(unsupported()),
        },
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
