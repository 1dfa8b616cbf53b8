/// Dataset table.
///
/// A Table is an ordered collection of equal-length typed columns plus the
/// synthetic identity column `uniqid`. Tables are plain values: the view
/// engines derive new tables from a borrowed snapshot and mutations produce a
/// fresh table that the session swaps in.
///
/// # Examples
///
/// ```
/// use rowmodel::{Table, Schema, ColumnType, ColumnValue};
/// use std::collections::HashMap;
///
/// let schema = Schema::new(vec![
///     ("part".to_string(), ColumnType::String, false),
///     ("qty".to_string(), ColumnType::Int64, true),
/// ]);
///
/// let mut table = Table::new("parts".to_string(), schema);
///
/// let mut row = HashMap::new();
/// row.insert("part".to_string(), ColumnValue::String("bolt".to_string()));
/// row.insert("qty".to_string(), ColumnValue::Int64(4));
/// table.append_row(row).unwrap();
///
/// let table = table.with_identity().unwrap();
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.get_value(0, "uniqid").unwrap().as_i64(), Some(0));
/// ```

use crate::column::{column_value_to_json, json_to_column_value, Column, ColumnType, ColumnValue};
use crate::error::{LoadError, TableError};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

/// Synthetic row identity, assigned `0..n` at load.
pub const IDENTITY_COLUMN: &str = "uniqid";
/// Number of rows represented by a summary row.
pub const CHILD_COUNT_COLUMN: &str = "childCount";
/// Summary-row flag.
pub const GROUP_FLAG_COLUMN: &str = "group";
/// Grid-side auto group column id. Only ever appears in sort models.
pub const AUTO_GROUP_COLUMN: &str = "ag-Grid-AutoColumn";

/// Columns that user operations may not add, drop, rename or edit.
pub const RESERVED_COLUMNS: [&str; 3] = [IDENTITY_COLUMN, CHILD_COUNT_COLUMN, GROUP_FLAG_COLUMN];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

const SNIFF_LINES: usize = 10;
const DELIMITER_CANDIDATES: [u8; 5] = [b',', b';', b'\t', b' ', b'|'];

/// Schema definition: `(name, type, nullable)` per column.
///
/// ```
/// use rowmodel::{Schema, ColumnType};
///
/// let schema = Schema::new(vec![
///     ("part".to_string(), ColumnType::String, false),
///     ("qty".to_string(), ColumnType::Int64, true),
/// ]);
///
/// assert_eq!(schema.len(), 2);
/// assert_eq!(schema.get_column_index("qty"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<(String, ColumnType, bool)>,
}

impl Schema {
    pub fn new(columns: Vec<(String, ColumnType, bool)>) -> Self {
        Schema { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _, _)| n == name)
    }
}

/// An in-memory dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(name: String, schema: Schema) -> Self {
        let columns = schema
            .columns
            .into_iter()
            .map(|(col_name, col_type, nullable)| Column::new(col_name, col_type, nullable))
            .collect();
        Table {
            name,
            columns,
            row_count: 0,
        }
    }

    /// Assemble a table from prepared columns. All columns must share one
    /// length and have distinct names.
    pub fn from_columns(name: String, columns: Vec<Column>) -> Result<Self, TableError> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name().to_string()) {
                return Err(TableError::DuplicateColumn(column.name().to_string()));
            }
            if column.len() != row_count {
                return Err(TableError::LengthMismatch {
                    column: column.name().to_string(),
                    expected: row_count,
                    got: column.len(),
                });
            }
        }
        Ok(Table {
            name,
            columns,
            row_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| (c.name().to_string(), c.column_type(), c.is_nullable()))
                .collect(),
        )
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Like [`Table::column`] but with a typed error for missing columns.
    pub fn require_column(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn get_value(&self, row: usize, column: &str) -> Result<&ColumnValue, TableError> {
        self.require_column(column)?.get(row)
    }

    pub fn set_value(&mut self, row: usize, column: &str, value: ColumnValue) -> Result<(), TableError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| TableError::ColumnNotFound(column.to_string()))?;
        self.columns[index].set(row, value)
    }

    pub fn append_row(&mut self, row: HashMap<String, ColumnValue>) -> Result<(), TableError> {
        self.insert_row(self.row_count, row)
    }

    /// Insert a row at `index`. Missing cells are stored as null, which
    /// fails for non-nullable columns. Nothing is written unless every
    /// cell validates.
    pub fn insert_row(
        &mut self,
        index: usize,
        mut row: HashMap<String, ColumnValue>,
    ) -> Result<(), TableError> {
        if index > self.row_count {
            return Err(TableError::RowOutOfRange {
                index,
                len: self.row_count,
            });
        }
        for name in row.keys() {
            if !self.has_column(name) {
                return Err(TableError::ColumnNotFound(name.clone()));
            }
        }

        let mut staged = self.columns.clone();
        for column in staged.iter_mut() {
            let value = row.remove(column.name()).unwrap_or(ColumnValue::Null);
            if value.is_null() && !column.is_nullable() {
                return Err(TableError::MissingValue(column.name().to_string()));
            }
            column.insert(index, value)?;
        }
        self.columns = staged;
        self.row_count += 1;
        Ok(())
    }

    /// Delete the rows at the given positions. Duplicates are ignored.
    pub fn delete_rows(&mut self, indices: &[usize]) -> Result<usize, TableError> {
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        if let Some(&bad) = doomed.iter().find(|&&i| i >= self.row_count) {
            return Err(TableError::RowOutOfRange {
                index: bad,
                len: self.row_count,
            });
        }
        let keep: Vec<usize> = (0..self.row_count).filter(|i| !doomed.contains(i)).collect();
        *self = self.take(&keep)?;
        Ok(doomed.len())
    }

    /// Gather rows by position into a new table with the same shape.
    pub fn take(&self, indices: &[usize]) -> Result<Table, TableError> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.take(indices))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table {
            name: self.name.clone(),
            columns,
            row_count: indices.len(),
        })
    }

    /// Rows `[start, end)`, clamped to the table height.
    pub fn slice(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.row_count);
        let start = start.min(end);
        let indices: Vec<usize> = (start..end).collect();
        // Indices are in range by construction.
        self.take(&indices).unwrap_or_else(|_| self.empty_like())
    }

    /// Same columns, zero rows.
    pub fn empty_like(&self) -> Table {
        Table {
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name(), c.column_type(), c.is_nullable()))
                .collect(),
            row_count: 0,
        }
    }

    /// Add `column`, replacing any existing column with the same name in place.
    pub fn with_column(mut self, column: Column) -> Result<Table, TableError> {
        if column.len() != self.row_count && !self.columns.is_empty() {
            return Err(TableError::LengthMismatch {
                column: column.name().to_string(),
                expected: self.row_count,
                got: column.len(),
            });
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        }
        match self.column_index(column.name()) {
            Some(index) => self.columns[index] = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    pub fn drop_column(&mut self, name: &str) -> Result<Column, TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
        Ok(self.columns.remove(index))
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), TableError> {
        if old != new && self.has_column(new) {
            return Err(TableError::DuplicateColumn(new.to_string()));
        }
        let index = self
            .column_index(old)
            .ok_or_else(|| TableError::ColumnNotFound(old.to_string()))?;
        self.columns[index].set_name(new);
        Ok(())
    }

    /// Assign (or reassign) the identity column as `0..n` in current order.
    pub fn with_identity(self) -> Result<Table, TableError> {
        let ids = (0..self.row_count as i64).map(ColumnValue::Int64).collect();
        let identity = Column::from_values(IDENTITY_COLUMN, ColumnType::Int64, false, ids)?;
        self.with_column(identity)
    }

    /// Row position of the given identity value.
    pub fn find_identity(&self, id: i64) -> Option<usize> {
        self.column(IDENTITY_COLUMN)?
            .iter()
            .position(|v| v.as_i64() == Some(id))
    }

    /// Rows as JSON objects keyed by column name, in column order.
    pub fn to_records(&self) -> Vec<JsonValue> {
        (0..self.row_count)
            .map(|row| {
                let mut record = Map::with_capacity(self.columns.len());
                for column in &self.columns {
                    let value = column
                        .get(row)
                        .map(column_value_to_json)
                        .unwrap_or(JsonValue::Null);
                    record.insert(column.name().to_string(), value);
                }
                JsonValue::Object(record)
            })
            .collect()
    }

    /// Load an array of JSON objects. Column order follows first appearance;
    /// a key missing from a record is null. Identity is assigned afterwards.
    pub fn from_json(name: String, text: &str) -> Result<Table, LoadError> {
        let parsed: JsonValue = serde_json::from_str(text)?;
        let records = parsed.as_array().ok_or(LoadError::NotAnArrayOfObjects)?;

        let mut order: Vec<String> = Vec::new();
        let mut cells: HashMap<String, Vec<ColumnValue>> = HashMap::new();
        for (row, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or(LoadError::NotAnArrayOfObjects)?;
            for (key, value) in object {
                let value = json_to_column_value(value)
                    .ok_or_else(|| LoadError::UnsupportedJsonValue(key.clone()))?;
                let slot = cells.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    vec![ColumnValue::Null; row]
                });
                slot.push(value);
            }
            for slot in cells.values_mut() {
                if slot.len() < row + 1 {
                    slot.push(ColumnValue::Null);
                }
            }
        }

        let mut columns = Vec::with_capacity(order.len());
        for key in order {
            let values = cells.remove(&key).unwrap_or_default();
            let column_type = infer_json_type(&key, &values)?;
            columns.push(Column::from_values(key, column_type, true, values)?);
        }
        Ok(Table::from_columns(name, columns)?.with_identity()?)
    }

    /// Load a `.json` array of objects or any delimited text file.
    pub fn from_path(path: &Path) -> Result<Table, LoadError> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            return Table::from_csv_path(path);
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        Table::from_json(name, &std::fs::read_to_string(path)?)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Table, LoadError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let file = std::fs::File::open(path)?;
        Table::from_csv_reader(name, file)
    }

    /// Load delimited text. The delimiter is sniffed from the first lines,
    /// cells are trimmed and column types inferred (float, narrowed to int
    /// when every value is integral, else text). Numeric blanks load as 0,
    /// text blanks as "". Identity is assigned afterwards.
    pub fn from_csv_reader<R: Read>(name: String, mut reader: R) -> Result<Table, LoadError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Err(LoadError::EmptyInput);
        }

        let delimiter = detect_delimiter(&text);
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(LoadError::EmptyHeader);
        }

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in csv_reader.records() {
            let record = record?;
            for (i, cells) in raw.iter_mut().enumerate() {
                cells.push(record.get(i).unwrap_or("").to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(header, cells)| infer_text_column(header, cells))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::from_columns(name, columns)?.with_identity()?)
    }
}

/// Pick the candidate delimiter occurring most often in the leading lines.
/// Ties go to the earlier candidate, so plain CSV wins by default.
fn detect_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text.lines().take(SNIFF_LINES).collect();
    let mut best = (b',', 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let count: usize = sample
            .iter()
            .map(|line| line.bytes().filter(|&b| b == candidate).count())
            .sum();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn infer_text_column(name: String, cells: Vec<String>) -> Result<Column, TableError> {
    let filled: Vec<&String> = cells.iter().filter(|c| !c.is_empty()).collect();
    let parsed: Option<Vec<f64>> = if filled.is_empty() {
        None
    } else {
        filled.iter().map(|c| c.parse::<f64>().ok()).collect()
    };

    match parsed {
        Some(numbers) if numbers.iter().all(|n| n.fract() == 0.0 && n.abs() < 9.0e15) => {
            let values = cells
                .iter()
                .map(|c| ColumnValue::Int64(c.parse::<f64>().map(|n| n as i64).unwrap_or(0)))
                .collect();
            Column::from_values(name, ColumnType::Int64, true, values)
        }
        Some(_) => {
            let values = cells
                .iter()
                .map(|c| ColumnValue::Float64(c.parse::<f64>().unwrap_or(0.0)))
                .collect();
            Column::from_values(name, ColumnType::Float64, true, values)
        }
        None => {
            let values = cells.into_iter().map(ColumnValue::String).collect();
            Column::from_values(name, ColumnType::String, true, values)
        }
    }
}

fn infer_json_type(column: &str, values: &[ColumnValue]) -> Result<ColumnType, LoadError> {
    let mut inferred: Option<ColumnType> = None;
    for value in values.iter().filter(|v| !v.is_null()) {
        let this = match value {
            ColumnValue::Int64(_) => ColumnType::Int64,
            ColumnValue::Float64(_) => ColumnType::Float64,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::Null => continue,
        };
        inferred = match (inferred, this) {
            (None, t) => Some(t),
            (Some(a), b) if a == b => Some(a),
            (Some(ColumnType::Int64), ColumnType::Float64)
            | (Some(ColumnType::Float64), ColumnType::Int64) => Some(ColumnType::Float64),
            _ => return Err(LoadError::UnsupportedJsonValue(column.to_string())),
        };
    }
    Ok(inferred.unwrap_or(ColumnType::String))
}
