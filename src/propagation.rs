/// Mutation and propagation engine.
///
/// An edit event names one cell by column and row identity. The new value is
/// written to every row that matches the edited row under the column's
/// propagation rule: identity alone by default, a configurable business-key
/// set for the status column. Numeric rule columns match within a
/// [`Tolerance`]; text columns match exactly.
///
/// Edits are all-or-nothing. The input table is never touched; on success a
/// new table is returned together with the grouped route the client must
/// refresh.

use crate::column::{json_to_column_value, ColumnKind, ColumnType, ColumnValue};
use crate::error::PropagationError;
use crate::pipeline::ViewRequest;
use crate::table::{is_reserved, Table, GROUP_FLAG_COLUMN, IDENTITY_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Suffix appended to the editor's name on rows reached by propagation.
pub const PROPAGATED_SUFFIX: &str = " (propagated)";

/// Largest `decimals` a [`Tolerance`] accepts. Beyond this `10^decimals`
/// stops representing distinct f64 steps.
pub const MAX_TOLERANCE_DECIMALS: u32 = 15;

/// Numeric match tolerance: values are biased by `epsilon` and rounded to
/// `decimals` places before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub decimals: u32,
    pub epsilon: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance {
            decimals: 3,
            epsilon: 1e-9,
        }
    }
}

impl Tolerance {
    pub fn quantize(&self, x: f64) -> f64 {
        let scale = 10f64.powi(self.decimals.min(MAX_TOLERANCE_DECIMALS) as i32);
        ((x + self.epsilon) * scale).round() / scale
    }

    /// Missing numbers (NaN) match each other so an edit on such a row
    /// still reaches its twins.
    pub fn matches(&self, a: f64, b: f64) -> bool {
        let (x, y) = (self.quantize(a), self.quantize(b));
        x == y || (x.is_nan() && y.is_nan())
    }
}

/// Hierarchical-path mode: the route comes from splitting one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMode {
    pub column: String,
    #[serde(default = "default_tree_delimiter")]
    pub delimiter: String,
}

fn default_tree_delimiter() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    pub status_column: String,
    pub audit_column: String,
    pub editor: String,
    /// Rule used when the status column is edited. Empty means identity.
    pub business_keys: Vec<String>,
    pub tolerance: Tolerance,
    pub tree: Option<TreeMode>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        PropagationConfig {
            status_column: "waiver".to_string(),
            audit_column: "user".to_string(),
            editor: "unknown".to_string(),
            business_keys: Vec::new(),
            tolerance: Tolerance::default(),
            tree: None,
        }
    }
}

impl PropagationConfig {
    /// Columns that decide which rows an edit to `column` reaches.
    pub fn rule_for(&self, column: &str) -> Vec<String> {
        if column == self.status_column && !self.business_keys.is_empty() {
            self.business_keys.clone()
        } else {
            vec![IDENTITY_COLUMN.to_string()]
        }
    }
}

/// A single cell edit from the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
    pub column: String,
    pub new_value: JsonValue,
    pub edited_row_identity: i64,
    /// Set by the client when the edited row was a summary row.
    #[serde(default)]
    pub group: bool,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub table: Table,
    /// Group keys of the subtree to refresh, outermost first.
    pub route: Vec<String>,
    /// Rows that received the new value.
    pub affected: usize,
}

fn is_summary(table: &Table, row: usize) -> bool {
    matches!(
        table.get_value(row, GROUP_FLAG_COLUMN),
        Ok(ColumnValue::Bool(true))
    )
}

/// Convert an edited JSON value to the target column's storage type.
fn coerce(value: &JsonValue, column: &str, column_type: ColumnType) -> Result<ColumnValue, PropagationError> {
    let invalid = || PropagationError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    };
    let cell = json_to_column_value(value).ok_or_else(invalid)?;
    if cell.is_null() {
        return Ok(cell);
    }
    let converted = match (column_type, &cell) {
        (ColumnType::String, _) => Some(ColumnValue::String(cell.to_text())),
        (ColumnType::Int64, ColumnValue::Int64(_)) => Some(cell.clone()),
        (ColumnType::Int64, ColumnValue::Float64(f)) if f.fract() == 0.0 => Some(ColumnValue::Int64(*f as i64)),
        (ColumnType::Int64, ColumnValue::String(s)) => s.trim().parse::<i64>().ok().map(ColumnValue::Int64),
        (ColumnType::Float64, _) => cell.parse_f64().map(ColumnValue::Float64),
        (ColumnType::Bool, ColumnValue::Bool(_)) => Some(cell.clone()),
        (ColumnType::Bool, ColumnValue::String(s)) => match s.as_str() {
            "true" => Some(ColumnValue::Bool(true)),
            "false" => Some(ColumnValue::Bool(false)),
            _ => None,
        },
        _ => None,
    };
    converted.ok_or_else(invalid)
}

fn cells_match(kind: ColumnKind, a: &ColumnValue, b: &ColumnValue, tolerance: &Tolerance) -> bool {
    match kind {
        ColumnKind::Numeric => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => tolerance.matches(x, y),
            _ => a.is_null() && b.is_null(),
        },
        ColumnKind::Text => a == b,
    }
}

/// Route of the edited row: its values at each active grouping dimension, or
/// its tree path without the leaf segment in tree mode.
fn compute_route(table: &Table, row: usize, request: &ViewRequest, tree: Option<&TreeMode>) -> Vec<String> {
    if let Some(tree) = tree {
        if let Ok(path) = table.get_value(row, &tree.column) {
            let path = path.to_text();
            let mut segments: Vec<String> = path.split(tree.delimiter.as_str()).map(str::to_string).collect();
            segments.pop();
            return segments;
        }
    }
    request
        .dimensions()
        .iter()
        .filter_map(|dim| table.get_value(row, dim).ok())
        .map(ColumnValue::to_text)
        .collect()
}

/// Apply an edit under the configured propagation rule.
pub fn apply_edit(
    table: &Table,
    event: &EditEvent,
    active_request: &ViewRequest,
    config: &PropagationConfig,
) -> Result<EditOutcome, PropagationError> {
    if !table.has_column(IDENTITY_COLUMN) {
        return Err(PropagationError::MissingIdentity);
    }
    if event.group {
        return Err(PropagationError::SummaryRow(event.edited_row_identity));
    }
    let target = table
        .column(&event.column)
        .ok_or_else(|| PropagationError::UnknownColumn(event.column.clone()))?;
    if is_reserved(&event.column) {
        return Err(PropagationError::ProtectedColumn(event.column.clone()));
    }
    let edited_row = table
        .find_identity(event.edited_row_identity)
        .ok_or(PropagationError::RowNotFound(event.edited_row_identity))?;
    if is_summary(table, edited_row) {
        return Err(PropagationError::SummaryRow(event.edited_row_identity));
    }

    let rule = config.rule_for(&event.column);
    let rule_columns = rule
        .iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| PropagationError::MissingRuleColumn(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let new_value = coerce(&event.new_value, &event.column, target.column_type())?;

    let matched: Vec<usize> = (0..table.len())
        .filter(|&row| !is_summary(table, row))
        .filter(|&row| {
            rule_columns.iter().all(|column| {
                let values = column.values();
                cells_match(column.kind(), &values[row], &values[edited_row], &config.tolerance)
            })
        })
        .collect();

    let stamp_audit = event.column == config.status_column && table.has_column(&config.audit_column);
    let mut updated = table.clone();
    for &row in &matched {
        updated.set_value(row, &event.column, new_value.clone())?;
        if stamp_audit {
            let stamp = if row == edited_row {
                config.editor.clone()
            } else {
                format!("{}{}", config.editor, PROPAGATED_SUFFIX)
            };
            updated.set_value(row, &config.audit_column, ColumnValue::String(stamp))?;
        }
    }

    let route = compute_route(table, edited_row, active_request, config.tree.as_ref());
    log::info!(
        "edit of '{}' on row {} reached {} rows (rule {:?})",
        event.column,
        event.edited_row_identity,
        matched.len(),
        rule
    );
    Ok(EditOutcome {
        table: updated,
        route,
        affected: matched.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_json(
            "sample".to_string(),
            r#"[
                {"block": "top",  "x": 1.0000001, "waiver": "",       "user": "", "path": "a/b/c"},
                {"block": "top",  "x": 1.0000002, "waiver": "",       "user": "", "path": "a/b/d"},
                {"block": "top",  "x": 1.5,       "waiver": "",       "user": "", "path": "a/e"},
                {"block": "core", "x": 1.0000001, "waiver": "Error",  "user": "", "path": "f"}
            ]"#,
        )
        .unwrap()
    }

    fn config() -> PropagationConfig {
        PropagationConfig {
            editor: "kim".to_string(),
            business_keys: vec!["block".to_string(), "x".to_string()],
            ..PropagationConfig::default()
        }
    }

    fn edit(column: &str, value: JsonValue, id: i64) -> EditEvent {
        EditEvent {
            column: column.to_string(),
            new_value: value,
            edited_row_identity: id,
            group: false,
        }
    }

    fn text(table: &Table, column: &str) -> Vec<String> {
        table.column(column).unwrap().iter().map(|v| v.to_text()).collect()
    }

    #[test]
    fn test_tolerance() {
        let tol = Tolerance::default();
        assert!(tol.matches(1.0000001, 1.0000002));
        assert!(!tol.matches(1.001, 1.002));
        assert_eq!(tol.quantize(2.0005), 2.001);
    }

    #[test]
    fn test_oversized_decimals_are_clamped() {
        let tol = Tolerance {
            decimals: 400,
            epsilon: 0.0,
        };
        assert!(tol.quantize(1.25).is_finite());
        assert!(tol.matches(1.25, 1.25));
        assert!(!tol.matches(1.25, 1.5));
    }

    #[test]
    fn test_status_edit_propagates_by_business_keys() {
        let t = sample();
        let out = apply_edit(&t, &edit("waiver", json!("Waiver"), 0), &ViewRequest::default(), &config()).unwrap();
        assert_eq!(out.affected, 2);
        assert_eq!(text(&out.table, "waiver"), vec!["Waiver", "Waiver", "", "Error"]);
        assert_eq!(text(&out.table, "user"), vec!["kim", "kim (propagated)", "", ""]);
        // input untouched
        assert_eq!(text(&t, "waiver"), vec!["", "", "", "Error"]);
    }

    #[test]
    fn test_other_columns_use_identity() {
        let t = sample();
        let out = apply_edit(&t, &edit("block", json!("edge"), 1), &ViewRequest::default(), &config()).unwrap();
        assert_eq!(out.affected, 1);
        assert_eq!(text(&out.table, "block"), vec!["top", "edge", "top", "core"]);
        assert_eq!(text(&out.table, "user"), vec!["", "", "", ""]);
    }

    #[test]
    fn test_missing_rule_column_is_all_or_nothing() {
        let t = sample();
        let cfg = PropagationConfig {
            business_keys: vec!["block".to_string(), "gone".to_string()],
            ..config()
        };
        let err = apply_edit(&t, &edit("waiver", json!("Fixed"), 0), &ViewRequest::default(), &cfg);
        assert_eq!(err.unwrap_err(), PropagationError::MissingRuleColumn("gone".to_string()));
    }

    #[test]
    fn test_route_from_dimensions() {
        let t = sample();
        let request: ViewRequest = serde_json::from_value(json!({
            "rowGroupCols": [{"id": "block"}, {"id": "waiver"}],
            "groupKeys": ["core"]
        }))
        .unwrap();
        let out = apply_edit(&t, &edit("waiver", json!("Fixed"), 3), &request, &config()).unwrap();
        assert_eq!(out.route, vec!["core".to_string(), "Error".to_string()]);
    }

    #[test]
    fn test_route_in_tree_mode() {
        let t = sample();
        let cfg = PropagationConfig {
            tree: Some(TreeMode {
                column: "path".to_string(),
                delimiter: "/".to_string(),
            }),
            ..config()
        };
        let out = apply_edit(&t, &edit("block", json!("x"), 1), &ViewRequest::default(), &cfg).unwrap();
        assert_eq!(out.route, vec!["a".to_string(), "b".to_string()]);
        let out = apply_edit(&t, &edit("block", json!("x"), 3), &ViewRequest::default(), &cfg).unwrap();
        assert!(out.route.is_empty());
    }

    #[test]
    fn test_rejections() {
        let t = sample();
        let req = ViewRequest::default();
        let cfg = config();

        let mut summary = edit("waiver", json!("Waiver"), 0);
        summary.group = true;
        assert_eq!(apply_edit(&t, &summary, &req, &cfg).unwrap_err(), PropagationError::SummaryRow(0));

        assert_eq!(
            apply_edit(&t, &edit("waiver", json!("Waiver"), 99), &req, &cfg).unwrap_err(),
            PropagationError::RowNotFound(99)
        );
        assert_eq!(
            apply_edit(&t, &edit("uniqid", json!(5), 0), &req, &cfg).unwrap_err(),
            PropagationError::ProtectedColumn("uniqid".to_string())
        );
        assert_eq!(
            apply_edit(&t, &edit("nope", json!(5), 0), &req, &cfg).unwrap_err(),
            PropagationError::UnknownColumn("nope".to_string())
        );
        assert!(matches!(
            apply_edit(&t, &edit("x", json!("wide"), 0), &req, &cfg),
            Err(PropagationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_nan_keys_match_each_other() {
        let tol = Tolerance::default();
        assert!(tol.matches(f64::NAN, f64::NAN));
        assert!(!tol.matches(f64::NAN, 1.0));

        let csv = "block,x,waiver,user\ntop,NaN,,\ntop,NaN,,\ntop,2.5,,\n";
        let t = Table::from_csv_reader("nan".to_string(), csv.as_bytes()).unwrap();
        let out = apply_edit(&t, &edit("waiver", json!("Waiver"), 1), &ViewRequest::default(), &config()).unwrap();
        assert_eq!(out.affected, 2);
        assert_eq!(text(&out.table, "waiver"), vec!["Waiver", "Waiver", ""]);
        assert_eq!(text(&out.table, "user"), vec!["kim (propagated)", "kim", ""]);
    }

    #[test]
    fn test_summary_rows_are_never_propagation_targets() {
        let t = Table::from_json(
            "mixed".to_string(),
            r#"[
                {"block": "top", "x": 1.0, "waiver": "",      "user": "", "group": false},
                {"block": "top", "x": 1.0, "waiver": "Error", "user": "", "group": true},
                {"block": "top", "x": 1.0, "waiver": "",      "user": "", "group": false}
            ]"#,
        )
        .unwrap();
        let out = apply_edit(&t, &edit("waiver", json!("Waiver"), 0), &ViewRequest::default(), &config()).unwrap();
        assert_eq!(out.affected, 2);
        assert_eq!(text(&out.table, "waiver"), vec!["Waiver", "Error", "Waiver"]);
        assert_eq!(text(&out.table, "user"), vec!["kim", "", "kim (propagated)"]);

        // the flagged row itself cannot be edited either
        let err = apply_edit(&t, &edit("waiver", json!("Waiver"), 1), &ViewRequest::default(), &config());
        assert_eq!(err.unwrap_err(), PropagationError::SummaryRow(1));
    }

    #[test]
    fn test_numeric_edit_coerces() {
        let t = sample();
        let out = apply_edit(&t, &edit("x", json!("2.5"), 2), &ViewRequest::default(), &config()).unwrap();
        assert_eq!(out.table.get_value(2, "x").unwrap(), &ColumnValue::Float64(2.5));
    }
}
