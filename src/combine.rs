/// Combining the dataset with a second table.
///
/// [`concat_tables`] stacks the incoming rows below the current ones;
/// [`join_tables`] pairs rows on a key column. The incoming identity column
/// is always dropped and the result carries none, so the caller renumbers.

use crate::column::{Column, ColumnType, ColumnValue, ValueKey};
use crate::error::TableError;
use crate::table::{is_reserved, Table, IDENTITY_COLUMN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suffix for incoming join columns whose name is already taken.
pub const DEFAULT_JOIN_SUFFIX: &str = "_right";

/// Join type specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinHow {
    /// Only rows with a match on both sides
    Inner,
    /// Every current row; unmatched rows get nulls in the incoming columns
    Left,
}

/// Non-identity columns of an incoming table. Summary markers are refused.
fn incoming_columns(table: &Table) -> Result<Vec<&Column>, TableError> {
    let mut columns = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        if column.name() == IDENTITY_COLUMN {
            continue;
        }
        if is_reserved(column.name()) {
            return Err(TableError::ReservedColumn(column.name().to_string()));
        }
        columns.push(column);
    }
    Ok(columns)
}

fn common_type(column: &str, a: ColumnType, b: ColumnType) -> Result<ColumnType, TableError> {
    match (a, b) {
        (a, b) if a == b => Ok(a),
        (ColumnType::Int64, ColumnType::Float64) | (ColumnType::Float64, ColumnType::Int64) => {
            Ok(ColumnType::Float64)
        }
        (a, b) => Err(TableError::TypeMismatch {
            column: column.to_string(),
            expected: a.name().to_string(),
            got: b.name().to_string(),
        }),
    }
}

fn push_cells(out: &mut Vec<ColumnValue>, column: Option<&Column>, len: usize) {
    match column {
        Some(column) => out.extend(column.values().iter().cloned()),
        None => out.extend(std::iter::repeat(ColumnValue::Null).take(len)),
    }
}

/// Append `incoming` below `current`.
///
/// Columns are matched by name and keep `current`'s order; columns only the
/// incoming table has go last. A column missing on one side is null there.
/// Integer and float columns widen to float; any other type clash fails.
/// With `source_column`, a text column naming each row's table is added.
pub fn concat_tables(
    current: &Table,
    incoming: &Table,
    source_column: Option<&str>,
) -> Result<Table, TableError> {
    let extra = incoming_columns(incoming)?;
    let mut names: Vec<&str> = current
        .columns()
        .iter()
        .map(Column::name)
        .filter(|name| *name != IDENTITY_COLUMN)
        .collect();
    for column in &extra {
        if !current.has_column(column.name()) {
            names.push(column.name());
        }
    }

    let total = current.len() + incoming.len();
    let mut columns = Vec::with_capacity(names.len() + 1);
    for &name in &names {
        let top = current.column(name);
        let bottom = incoming.column(name);
        let column_type = match (top, bottom) {
            (Some(a), Some(b)) => common_type(name, a.column_type(), b.column_type())?,
            (Some(a), None) => a.column_type(),
            (None, Some(b)) => b.column_type(),
            (None, None) => continue,
        };
        let mut values = Vec::with_capacity(total);
        push_cells(&mut values, top, current.len());
        push_cells(&mut values, bottom, incoming.len());
        columns.push(Column::from_values(name, column_type, true, values)?);
    }

    if let Some(source) = source_column {
        if is_reserved(source) {
            return Err(TableError::ReservedColumn(source.to_string()));
        }
        if names.contains(&source) {
            return Err(TableError::DuplicateColumn(source.to_string()));
        }
        let mut labels = vec![ColumnValue::String(current.name().to_string()); current.len()];
        labels.extend(vec![ColumnValue::String(incoming.name().to_string()); incoming.len()]);
        columns.push(Column::from_values(source, ColumnType::String, false, labels)?);
    }
    Table::from_columns(current.name().to_string(), columns)
}

/// Join `right` onto `left` where `left_key` equals `right_key`.
///
/// Output follows `left`'s row order, one row per match in `right`'s order.
/// Null keys never match. The right key column is dropped; other right
/// columns whose name `left` already uses get `suffix` appended.
pub fn join_tables(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
    how: JoinHow,
    suffix: &str,
) -> Result<Table, TableError> {
    let left_keys = left.require_column(left_key)?;
    let right_keys = right.require_column(right_key)?;
    let extra = incoming_columns(right)?;

    let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
    for (row, value) in right_keys.values().iter().enumerate() {
        if !value.is_null() {
            index.entry(value.key()).or_default().push(row);
        }
    }

    let mut left_rows = Vec::with_capacity(left.len());
    let mut right_rows: Vec<Option<usize>> = Vec::with_capacity(left.len());
    for (row, value) in left_keys.values().iter().enumerate() {
        let matched = if value.is_null() { None } else { index.get(&value.key()) };
        match (matched, how) {
            (Some(rows), _) => {
                for &other in rows {
                    left_rows.push(row);
                    right_rows.push(Some(other));
                }
            }
            (None, JoinHow::Left) => {
                left_rows.push(row);
                right_rows.push(None);
            }
            (None, JoinHow::Inner) => {}
        }
    }

    let mut columns = left
        .columns()
        .iter()
        .filter(|c| c.name() != IDENTITY_COLUMN)
        .map(|c| c.take(&left_rows))
        .collect::<Result<Vec<_>, _>>()?;
    for column in extra.into_iter().filter(|c| c.name() != right_key) {
        let mut name = column.name().to_string();
        if left.has_column(&name) {
            name.push_str(suffix);
        }
        let values = right_rows
            .iter()
            .map(|row| match row {
                Some(row) => column.values()[*row].clone(),
                None => ColumnValue::Null,
            })
            .collect();
        columns.push(Column::from_values(name, column.column_type(), true, values)?);
    }

    log::debug!(
        "{:?} join on {} = {} produced {} rows",
        how,
        left_key,
        right_key,
        left_rows.len()
    );
    Table::from_columns(left.name().to_string(), columns)
}
