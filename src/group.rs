/// Group and aggregation engine.
///
/// Implements drill-down grouping as a state machine over the request's drill
/// path:
///
/// * no dimensions: rows pass through unchanged
/// * no drill path: one summary row per distinct value of the first dimension
/// * partial drill path: rows are narrowed to the chosen keys and summarised
///   one level deeper, with a diagnostic string describing each level
/// * complete drill path: the narrowed leaf rows are returned as ordinary rows
///
/// Summary rows carry `childCount` (group size) and `group = true`. Requested
/// aggregations replace the representative first-row values.

use crate::column::{Column, ColumnType, ColumnValue, ValueKey};
use crate::error::{GroupError, PipelineError};
use crate::table::{Table, CHILD_COUNT_COLUMN, GROUP_FLAG_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Supported aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Avg,
    Count,
    First,
    Last,
    Min,
    Max,
    Sum,
}

impl AggFunc {
    pub fn parse(name: &str) -> Result<Self, GroupError> {
        match name {
            "avg" => Ok(AggFunc::Avg),
            "count" => Ok(AggFunc::Count),
            "first" => Ok(AggFunc::First),
            "last" => Ok(AggFunc::Last),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "sum" => Ok(AggFunc::Sum),
            other => Err(GroupError::UnknownAggregation(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Avg => "avg",
            AggFunc::Count => "count",
            AggFunc::First => "first",
            AggFunc::Last => "last",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Sum => "sum",
        }
    }

    /// Aggregate the cells of `column` at `rows`.
    fn apply(&self, column: &Column, rows: &[usize]) -> Result<ColumnValue, GroupError> {
        let values = column.values();
        let non_null = || rows.iter().map(|&r| &values[r]).filter(|v| !v.is_null());
        let numeric_only = || {
            if column.column_type() == ColumnType::Int64 || column.column_type() == ColumnType::Float64 {
                Ok(())
            } else {
                Err(GroupError::NonNumericAggregate {
                    func: self.name().to_string(),
                    column: column.name().to_string(),
                })
            }
        };

        Ok(match self {
            AggFunc::Count => ColumnValue::Int64(non_null().count() as i64),
            AggFunc::First => rows.first().map(|&r| values[r].clone()).unwrap_or(ColumnValue::Null),
            AggFunc::Last => rows.last().map(|&r| values[r].clone()).unwrap_or(ColumnValue::Null),
            AggFunc::Sum => {
                numeric_only()?;
                match column.column_type() {
                    ColumnType::Int64 => {
                        ColumnValue::Int64(non_null().filter_map(ColumnValue::as_i64).sum())
                    }
                    _ => ColumnValue::Float64(non_null().filter_map(ColumnValue::as_f64).sum()),
                }
            }
            AggFunc::Avg => {
                numeric_only()?;
                let numbers: Vec<f64> = non_null().filter_map(ColumnValue::as_f64).collect();
                if numbers.is_empty() {
                    ColumnValue::Null
                } else {
                    ColumnValue::Float64(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggFunc::Min => non_null()
                .min_by(|a, b| compare_cells(a, b))
                .cloned()
                .unwrap_or(ColumnValue::Null),
            AggFunc::Max => non_null()
                .max_by(|a, b| compare_cells(a, b))
                .cloned()
                .unwrap_or(ColumnValue::Null),
        })
    }

    fn output_type(&self, input: ColumnType) -> ColumnType {
        match self {
            AggFunc::Count => ColumnType::Int64,
            AggFunc::Avg => ColumnType::Float64,
            _ => input,
        }
    }
}

fn compare_cells(a: &ColumnValue, b: &ColumnValue) -> Ordering {
    match (a, b) {
        (ColumnValue::Int64(x), ColumnValue::Int64(y)) => x.cmp(y),
        (ColumnValue::Bool(x), ColumnValue::Bool(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_text().cmp(&b.to_text()),
        },
    }
}

/// `rowGroupCols` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowGroupCol {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl RowGroupCol {
    pub fn new(id: impl Into<String>) -> Self {
        RowGroupCol {
            id: id.into(),
            display_name: None,
            field: None,
        }
    }
}

/// `valueCols` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueCol {
    pub id: String,
    pub agg_func: String,
}

impl ValueCol {
    pub fn new(id: impl Into<String>, agg_func: impl Into<String>) -> Self {
        ValueCol {
            id: id.into(),
            agg_func: agg_func.into(),
        }
    }
}

/// A chosen group key. `NoValue` is the client's null key and always selects
/// an empty group.
#[derive(Debug, Clone, PartialEq)]
pub enum DrillKey {
    Value(ColumnValue),
    NoValue,
}

impl DrillKey {
    pub fn from_json(value: &JsonValue) -> Result<Self, GroupError> {
        match value {
            JsonValue::Null => Ok(DrillKey::NoValue),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(GroupError::InvalidDrillKey(value.to_string()))
            }
            scalar => crate::column::json_to_column_value(scalar)
                .map(DrillKey::Value)
                .ok_or_else(|| GroupError::InvalidDrillKey(value.to_string())),
        }
    }

    /// Keys arrive stringified from the client, so a numeric cell also
    /// matches a key that parses to the same number.
    pub fn matches(&self, cell: &ColumnValue) -> bool {
        let DrillKey::Value(key) = self else {
            return false;
        };
        if cell.is_null() || key.is_null() {
            return false;
        }
        match (cell.as_f64(), key.parse_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => cell.to_text() == key.to_text(),
        }
    }

    fn label(&self) -> String {
        match self {
            DrillKey::Value(v) => v.to_text(),
            DrillKey::NoValue => "None".to_string(),
        }
    }
}

/// Validated grouping request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRequest {
    pub dimensions: Vec<String>,
    pub drill_path: Vec<DrillKey>,
    pub aggregations: Vec<(String, AggFunc)>,
}

impl GroupRequest {
    pub fn from_wire(
        row_group_cols: &[RowGroupCol],
        group_keys: &[JsonValue],
        value_cols: &[ValueCol],
    ) -> Result<Self, GroupError> {
        let dimensions: Vec<String> = row_group_cols.iter().map(|c| c.id.clone()).collect();
        if group_keys.len() > dimensions.len() {
            return Err(GroupError::DrillPathTooLong {
                keys: group_keys.len(),
                dimensions: dimensions.len(),
            });
        }
        let drill_path = group_keys
            .iter()
            .map(DrillKey::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        let aggregations = value_cols
            .iter()
            .map(|c| Ok((c.id.clone(), AggFunc::parse(&c.agg_func)?)))
            .collect::<Result<Vec<_>, GroupError>>()?;
        Ok(GroupRequest {
            dimensions,
            drill_path,
            aggregations,
        })
    }
}

/// Session-level settings that shape grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOptions {
    /// Blanked on summary rows unless it is itself a dimension.
    pub status_column: String,
    pub hide_superseded: bool,
    /// Trailing marker on a superseded status value.
    pub superseded_marker: String,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            status_column: "waiver".to_string(),
            hide_superseded: false,
            superseded_marker: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub table: Table,
    /// Display-only description of the drill state, e.g. `"3 (A: 2)"`.
    pub diagnostics: String,
}

/// Format a count with `,` thousands separators.
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn distinct_count(column: &Column, rows: &[usize]) -> usize {
    let values = column.values();
    rows.iter()
        .map(|&r| values[r].key())
        .collect::<HashSet<ValueKey>>()
        .len()
}

/// Run the grouping state machine over `table`.
pub fn apply_group(
    table: &Table,
    request: &GroupRequest,
    options: &GroupOptions,
) -> Result<GroupOutcome, PipelineError> {
    let working = if options.hide_superseded && table.has_column(&options.status_column) {
        let status = table.require_column(&options.status_column)?;
        let keep: Vec<usize> = status
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.to_text().ends_with(options.superseded_marker.as_str()))
            .map(|(i, _)| i)
            .collect();
        log::debug!("hiding {} superseded rows", table.len() - keep.len());
        table.take(&keep)?
    } else {
        table.clone()
    };

    let dims = &request.dimensions;
    if dims.is_empty() {
        return Ok(GroupOutcome {
            table: working,
            diagnostics: String::new(),
        });
    }
    if request.drill_path.len() > dims.len() {
        return Err(GroupError::DrillPathTooLong {
            keys: request.drill_path.len(),
            dimensions: dims.len(),
        }
        .into());
    }
    let dim_columns = dims
        .iter()
        .map(|d| {
            working
                .column(d)
                .ok_or_else(|| GroupError::UnknownColumn(d.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (column, _) in &request.aggregations {
        if !working.has_column(column) {
            return Err(GroupError::UnknownColumn(column.clone()).into());
        }
    }

    let mut rows: Vec<usize> = (0..working.len()).collect();

    if request.drill_path.is_empty() {
        let summary = summarize(&working, &rows, &dims[..1], request, options)?;
        let diagnostics = format_count(summary.len());
        return Ok(GroupOutcome {
            table: summary,
            diagnostics,
        });
    }

    let root_count = distinct_count(dim_columns[0], &rows);
    let mut levels = Vec::new();
    for (i, key) in request.drill_path.iter().enumerate() {
        if *key == DrillKey::NoValue {
            rows.clear();
            break;
        }
        let values = dim_columns[i].values();
        rows.retain(|&r| key.matches(&values[r]));
        if let Some(next) = dim_columns.get(i + 1) {
            levels.push(format!("{}: {}", key.label(), format_count(distinct_count(next, &rows))));
        }
    }
    let diagnostics = if levels.is_empty() {
        format_count(root_count)
    } else {
        format!("{} ({})", format_count(root_count), levels.join(", "))
    };

    let depth = request.drill_path.len();
    let table = if depth < dims.len() {
        summarize(&working, &rows, &dims[..depth + 1], request, options)?
    } else {
        let leaves = working.take(&rows)?;
        let flag = Column::filled(GROUP_FLAG_COLUMN, ColumnType::Bool, ColumnValue::Bool(false), leaves.len())?;
        leaves.with_column(flag)?
    };
    log::debug!("group depth {} of {} produced {} rows", depth, dims.len(), table.len());
    Ok(GroupOutcome { table, diagnostics })
}

/// One summary row per distinct combination of `group_by`, in first-seen
/// order over `rows`.
fn summarize(
    working: &Table,
    rows: &[usize],
    group_by: &[String],
    request: &GroupRequest,
    options: &GroupOptions,
) -> Result<Table, PipelineError> {
    let key_columns: Vec<&Column> = group_by
        .iter()
        .map(|d| working.require_column(d))
        .collect::<Result<_, _>>()?;

    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for &row in rows {
        let key: Vec<ValueKey> = key_columns.iter().map(|c| c.values()[row].key()).collect();
        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(row);
    }
    let firsts: Vec<usize> = buckets.iter().map(|b| b[0]).collect();

    let aggregations: Vec<&(String, AggFunc)> = request
        .aggregations
        .iter()
        .filter(|(column, _)| !group_by.contains(column))
        .collect();

    let mut summary = if aggregations.is_empty() {
        working.take(&firsts)?
    } else {
        let mut columns = Vec::with_capacity(group_by.len() + aggregations.len());
        for column in &key_columns {
            columns.push(column.take(&firsts)?);
        }
        for (name, func) in aggregations {
            let source = working.require_column(name)?;
            let values = buckets
                .iter()
                .map(|bucket| func.apply(source, bucket))
                .collect::<Result<Vec<_>, _>>()?;
            columns.push(Column::from_values(
                name.as_str(),
                func.output_type(source.column_type()),
                true,
                values,
            )?);
        }
        Table::from_columns(working.name().to_string(), columns)?
    };

    // Summary rows never carry a per-row status.
    if summary.has_column(&options.status_column)
        && !request.dimensions.contains(&options.status_column)
    {
        let blank = Column::filled(
            options.status_column.as_str(),
            ColumnType::String,
            ColumnValue::String(String::new()),
            firsts.len(),
        )?;
        summary = summary.with_column(blank)?;
    }

    let counts = buckets
        .iter()
        .map(|b| ColumnValue::Int64(b.len() as i64))
        .collect();
    summary = summary
        .with_column(Column::from_values(CHILD_COUNT_COLUMN, ColumnType::Int64, false, counts)?)?
        .with_column(Column::filled(
            GROUP_FLAG_COLUMN,
            ColumnType::Bool,
            ColumnValue::Bool(true),
            buckets.len(),
        )?)?;
    Ok(summary)
}
