/// Column storage and the column type oracle.
///
/// A Column is a named, typed, random-access vector of cells. Every engine in
/// the crate reads cells through `Column`; the only place that decides whether
/// a column compares numerically or textually is [`classify`].

use crate::error::TableError;
use serde_json::Value as JsonValue;
use std::fmt::Debug;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    String,
    Bool,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::String => "string",
            ColumnType::Bool => "bool",
        }
    }

    /// Comparison family of this storage type.
    ///
    /// Only 64-bit integer and 64-bit float storage is numeric. Booleans
    /// filter and compare by their `true`/`false` text.
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnType::Int64 | ColumnType::Float64 => ColumnKind::Numeric,
            ColumnType::String | ColumnType::Bool => ColumnKind::Text,
        }
    }
}

/// Comparison family used by filtering, casting and propagation matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Classify a column as numeric or textual.
///
/// Pure function of the column's storage type, so the answer is stable for the
/// lifetime of a dataset snapshot.
pub fn classify(column: &Column) -> ColumnKind {
    column.column_type().kind()
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int64(i64),
    Float64(f64),
    String(String),
    Bool(bool),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Null or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            ColumnValue::Null => true,
            ColumnValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int64(v) => Some(*v as f64),
            ColumnValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Uniform textual representation. Null renders as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            ColumnValue::Int64(v) => v.to_string(),
            ColumnValue::Float64(v) => v.to_string(),
            ColumnValue::String(v) => v.clone(),
            ColumnValue::Bool(v) => v.to_string(),
            ColumnValue::Null => String::new(),
        }
    }

    /// Best-effort numeric reading: numbers as-is, text parsed after trimming.
    pub fn parse_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Int64(_) => "int64",
            ColumnValue::Float64(_) => "float64",
            ColumnValue::String(_) => "string",
            ColumnValue::Bool(_) => "bool",
            ColumnValue::Null => "null",
        }
    }

    /// Hashable key used for distinct-value grouping.
    pub fn key(&self) -> ValueKey {
        match self {
            ColumnValue::Int64(v) => ValueKey::Int(*v),
            ColumnValue::Float64(v) => {
                let normalized = if *v == 0.0 {
                    0.0f64
                } else if v.is_nan() {
                    f64::NAN
                } else {
                    *v
                };
                ValueKey::Float(normalized.to_bits())
            }
            ColumnValue::String(v) => ValueKey::Text(v.clone()),
            ColumnValue::Bool(v) => ValueKey::Bool(*v),
            ColumnValue::Null => ValueKey::Null,
        }
    }
}

/// Hashable identity of a cell value. Floats are keyed by their bit pattern
/// after folding `-0.0` into `0.0` and every NaN into one NaN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Int(i64),
    Float(u64),
    Text(String),
    Bool(bool),
}

/// Convert a cell to JSON. Non-finite floats become null.
pub fn column_value_to_json(value: &ColumnValue) -> JsonValue {
    match value {
        ColumnValue::Int64(v) => JsonValue::Number((*v).into()),
        ColumnValue::Float64(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnValue::String(v) => JsonValue::String(v.clone()),
        ColumnValue::Bool(v) => JsonValue::Bool(*v),
        ColumnValue::Null => JsonValue::Null,
    }
}

/// Convert a JSON scalar to a cell. Arrays and objects have no cell form.
pub fn json_to_column_value(value: &JsonValue) -> Option<ColumnValue> {
    match value {
        JsonValue::Null => Some(ColumnValue::Null),
        JsonValue::Bool(b) => Some(ColumnValue::Bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ColumnValue::Int64(i))
            } else {
                n.as_f64().map(ColumnValue::Float64)
            }
        }
        JsonValue::String(s) => Some(ColumnValue::String(s.clone())),
        _ => None,
    }
}

/// A named, typed column of cells.
#[derive(Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    values: Vec<ColumnValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Column {
            name: name.into(),
            column_type,
            nullable,
            values: Vec::new(),
        }
    }

    /// Build a column from existing cells, validating every one.
    pub fn from_values(
        name: impl Into<String>,
        column_type: ColumnType,
        nullable: bool,
        values: Vec<ColumnValue>,
    ) -> Result<Self, TableError> {
        let mut column = Column::new(name, column_type, nullable);
        column.values.reserve(values.len());
        for value in values {
            column.append(value)?;
        }
        Ok(column)
    }

    /// A column holding `len` copies of `value`.
    pub fn filled(
        name: impl Into<String>,
        column_type: ColumnType,
        value: ColumnValue,
        len: usize,
    ) -> Result<Self, TableError> {
        let mut column = Column::new(name, column_type, true);
        let value = column.validate_value(value)?;
        column.values = vec![value; len];
        Ok(column)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn kind(&self) -> ColumnKind {
        classify(self)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnValue> {
        self.values.iter()
    }

    /// Validate and convert a value to this column's storage type.
    /// Integers widen into float columns; nothing else converts implicitly.
    fn validate_value(&self, value: ColumnValue) -> Result<ColumnValue, TableError> {
        if value.is_null() {
            if !self.nullable {
                return Err(TableError::NotNullable {
                    column: self.name.clone(),
                });
            }
            return Ok(ColumnValue::Null);
        }

        match (value, self.column_type) {
            (v @ ColumnValue::Int64(_), ColumnType::Int64) => Ok(v),
            (v @ ColumnValue::Float64(_), ColumnType::Float64) => Ok(v),
            (ColumnValue::Int64(n), ColumnType::Float64) => Ok(ColumnValue::Float64(n as f64)),
            (v @ ColumnValue::String(_), ColumnType::String) => Ok(v),
            (v @ ColumnValue::Bool(_), ColumnType::Bool) => Ok(v),
            (v, expected) => Err(TableError::TypeMismatch {
                column: self.name.clone(),
                expected: expected.name().to_string(),
                got: v.type_name().to_string(),
            }),
        }
    }

    fn out_of_range(&self, index: usize) -> TableError {
        TableError::RowOutOfRange {
            index,
            len: self.values.len(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&ColumnValue, TableError> {
        self.values.get(index).ok_or_else(|| self.out_of_range(index))
    }

    pub fn set(&mut self, index: usize, value: ColumnValue) -> Result<(), TableError> {
        let value = self.validate_value(value)?;
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(TableError::RowOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn insert(&mut self, index: usize, value: ColumnValue) -> Result<(), TableError> {
        if index > self.values.len() {
            return Err(self.out_of_range(index));
        }
        let value = self.validate_value(value)?;
        self.values.insert(index, value);
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<ColumnValue, TableError> {
        if index >= self.values.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.values.remove(index))
    }

    pub fn append(&mut self, value: ColumnValue) -> Result<(), TableError> {
        let value = self.validate_value(value)?;
        self.values.push(value);
        Ok(())
    }

    /// Gather the cells at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Result<Column, TableError> {
        let mut values = Vec::with_capacity(indices.len());
        for &index in indices {
            values.push(self.get(index)?.clone());
        }
        Ok(Column {
            name: self.name.clone(),
            column_type: self.column_type,
            nullable: self.nullable,
            values,
        })
    }
}

impl Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Column {{ name: '{}', type: {:?}, nullable: {}, len: {} }}",
            self.name,
            self.column_type,
            self.nullable,
            self.len()
        )
    }
}
