/// Filter engine.
///
/// Grid filter models arrive as loosely typed JSON. They are validated once
/// into a [`FilterNode`] tree of closed operator enums and then evaluated
/// against a table as index sets:
///
/// * a leaf keeps the rows whose cell satisfies its predicate
/// * `AND` narrows sequentially, each child seeing the previous child's output
/// * `OR` runs every child against the same input and unions the results,
///   dropping duplicates and keeping first-seen order
///
/// # Examples
///
/// ```
/// use rowmodel::filter::{parse_filter_model, apply_filter};
/// use rowmodel::Table;
/// use serde_json::json;
///
/// let table = Table::from_json(
///     "t".to_string(),
///     r#"[{"name": "alpha", "n": 1}, {"name": "beta", "n": 5}]"#,
/// ).unwrap();
///
/// let model = json!({"colId": "n", "filterType": "number", "type": "greaterThan", "filter": 2});
/// let node = parse_filter_model(&model).unwrap().unwrap();
/// let filtered = apply_filter(&table, &node).unwrap();
/// assert_eq!(filtered.len(), 1);
/// ```

use crate::column::{Column, ColumnValue};
use crate::error::{FilterError, PipelineError};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Wire form of a filter model node, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilterModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Legacy spelling of the compound operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_to: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<RawFilterModel>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOperator {
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Equals,
    NotEqual,
    Blank,
    NotBlank,
}

impl TextOperator {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "contains" => TextOperator::Contains,
            "notContains" => TextOperator::NotContains,
            "startsWith" => TextOperator::StartsWith,
            "notStartsWith" => TextOperator::NotStartsWith,
            "endsWith" => TextOperator::EndsWith,
            "notEndsWith" => TextOperator::NotEndsWith,
            "equals" => TextOperator::Equals,
            "notEqual" => TextOperator::NotEqual,
            "blank" => TextOperator::Blank,
            "notBlank" => TextOperator::NotBlank,
            _ => return None,
        })
    }

    fn needs_operand(&self) -> bool {
        !matches!(self, TextOperator::Blank | TextOperator::NotBlank)
    }

    /// Evaluate against a cell. Null reads as the empty string.
    pub fn matches(&self, cell: &ColumnValue, operand: &str) -> bool {
        let text = cell.to_text();
        match self {
            TextOperator::Contains => text.contains(operand),
            TextOperator::NotContains => !text.contains(operand),
            TextOperator::StartsWith => text.starts_with(operand),
            TextOperator::NotStartsWith => !text.starts_with(operand),
            TextOperator::EndsWith => text.ends_with(operand),
            TextOperator::NotEndsWith => !text.ends_with(operand),
            TextOperator::Equals => text == operand,
            TextOperator::NotEqual => text != operand,
            TextOperator::Blank => cell.is_blank(),
            TextOperator::NotBlank => !cell.is_blank(),
        }
    }
}

/// Numeric comparison with its operands bound. Comparisons are inclusive
/// where the name says so; `InRange` is inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberOperator {
    Equals(f64),
    NotEqual(f64),
    GreaterThan(f64),
    GreaterThanOrEqual(f64),
    LessThan(f64),
    LessThanOrEqual(f64),
    InRange(f64, f64),
    Blank,
    NotBlank,
}

impl NumberOperator {
    /// Evaluate against a cell. Text cells are parsed; null and unparsable
    /// cells only ever satisfy `Blank`.
    pub fn matches(&self, cell: &ColumnValue) -> bool {
        match self {
            NumberOperator::Blank => return cell.is_null(),
            NumberOperator::NotBlank => return !cell.is_null(),
            _ => {}
        }
        let Some(x) = cell.parse_f64() else {
            return false;
        };
        match *self {
            NumberOperator::Equals(v) => x == v,
            NumberOperator::NotEqual(v) => x != v,
            NumberOperator::GreaterThan(v) => x > v,
            NumberOperator::GreaterThanOrEqual(v) => x >= v,
            NumberOperator::LessThan(v) => x < v,
            NumberOperator::LessThanOrEqual(v) => x <= v,
            NumberOperator::InRange(lo, hi) => x >= lo && x <= hi,
            NumberOperator::Blank | NumberOperator::NotBlank => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Boolean(bool),
    Text(TextOperator, String),
    Number(NumberOperator),
}

impl Predicate {
    pub fn matches(&self, cell: &ColumnValue) -> bool {
        match self {
            Predicate::Boolean(expected) => match cell {
                ColumnValue::Bool(b) => b == expected,
                ColumnValue::Null => false,
                other => other.to_text() == expected.to_string(),
            },
            Predicate::Text(op, operand) => op.matches(cell, operand),
            Predicate::Number(op) => op.matches(cell),
        }
    }
}

/// Validated filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf { column: String, predicate: Predicate },
    Compound { op: CompoundOp, children: Vec<FilterNode> },
}

impl TryFrom<&RawFilterModel> for FilterNode {
    type Error = FilterError;

    fn try_from(raw: &RawFilterModel) -> Result<Self, Self::Error> {
        if let Some(conditions) = &raw.conditions {
            let op_name = raw
                .kind
                .as_deref()
                .or(raw.operator.as_deref())
                .unwrap_or("AND");
            let op = match op_name.to_ascii_uppercase().as_str() {
                "AND" => CompoundOp::And,
                "OR" => CompoundOp::Or,
                _ => return Err(FilterError::UnknownCompound(op_name.to_string())),
            };
            let children = conditions
                .iter()
                .map(FilterNode::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(FilterNode::Compound { op, children });
        }

        let column = raw.col_id.clone().ok_or(FilterError::MalformedNode)?;
        let predicate = parse_predicate(raw)?;
        Ok(FilterNode::Leaf { column, predicate })
    }
}

fn parse_predicate(raw: &RawFilterModel) -> Result<Predicate, FilterError> {
    let filter_type = raw.filter_type.as_deref().unwrap_or("text");
    let operator = raw.kind.as_deref().unwrap_or("");
    match filter_type {
        "boolean" => {
            let literal = match (operator, &raw.filter) {
                ("true", _) => true,
                ("false", _) => false,
                (_, Some(JsonValue::Bool(b))) => *b,
                (_, Some(JsonValue::String(s))) if s == "true" || s == "false" => s == "true",
                _ => {
                    return Err(FilterError::InvalidOperand {
                        operator: operator.to_string(),
                        expected: "boolean".to_string(),
                    })
                }
            };
            Ok(Predicate::Boolean(literal))
        }
        "text" => {
            let op = TextOperator::parse(operator).ok_or_else(|| FilterError::UnknownOperator {
                filter_type: filter_type.to_string(),
                operator: operator.to_string(),
            })?;
            let operand = match &raw.filter {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Number(n)) => n.to_string(),
                Some(JsonValue::Bool(b)) => b.to_string(),
                _ if !op.needs_operand() => String::new(),
                _ => {
                    return Err(FilterError::MissingOperand {
                        operator: operator.to_string(),
                    })
                }
            };
            Ok(Predicate::Text(op, operand))
        }
        "number" => {
            let first = || number_operand(operator, raw.filter.as_ref());
            let op = match operator {
                "equals" => NumberOperator::Equals(first()?),
                "notEqual" => NumberOperator::NotEqual(first()?),
                "greaterThan" => NumberOperator::GreaterThan(first()?),
                "greaterThanOrEqual" => NumberOperator::GreaterThanOrEqual(first()?),
                "lessThan" => NumberOperator::LessThan(first()?),
                "lessThanOrEqual" => NumberOperator::LessThanOrEqual(first()?),
                "inRange" => {
                    NumberOperator::InRange(first()?, number_operand(operator, raw.filter_to.as_ref())?)
                }
                "blank" => NumberOperator::Blank,
                "notBlank" => NumberOperator::NotBlank,
                _ => {
                    return Err(FilterError::UnknownOperator {
                        filter_type: filter_type.to_string(),
                        operator: operator.to_string(),
                    })
                }
            };
            Ok(Predicate::Number(op))
        }
        other => Err(FilterError::UnknownFilterType(other.to_string())),
    }
}

fn number_operand(operator: &str, value: Option<&JsonValue>) -> Result<f64, FilterError> {
    let invalid = || FilterError::InvalidOperand {
        operator: operator.to_string(),
        expected: "number".to_string(),
    };
    match value {
        None | Some(JsonValue::Null) => Err(FilterError::MissingOperand {
            operator: operator.to_string(),
        }),
        Some(JsonValue::Number(n)) => n.as_f64().ok_or_else(invalid),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Parse a request's `filterModel`.
///
/// Accepts a single node (`colId` leaf or `conditions` compound) or the
/// column-keyed map the grid sends when advanced filtering is off, which is
/// read as an AND of its entries. `null` and `{}` mean no filter.
pub fn parse_filter_model(value: &JsonValue) -> Result<Option<FilterNode>, FilterError> {
    let object = match value {
        JsonValue::Null => return Ok(None),
        JsonValue::Object(object) => object,
        _ => return Err(FilterError::MalformedNode),
    };
    if object.is_empty() {
        return Ok(None);
    }

    if object.contains_key("colId") || object.contains_key("conditions") {
        let raw: RawFilterModel =
            serde_json::from_value(value.clone()).map_err(|_| FilterError::MalformedNode)?;
        return FilterNode::try_from(&raw).map(Some);
    }

    let mut children = Vec::with_capacity(object.len());
    for (column, entry) in object {
        if !entry.is_object() {
            return Err(FilterError::MalformedNode);
        }
        let mut raw: RawFilterModel =
            serde_json::from_value(entry.clone()).map_err(|_| FilterError::MalformedNode)?;
        if raw.conditions.is_none() {
            raw.col_id = Some(column.clone());
        } else if let Some(conditions) = raw.conditions.as_mut() {
            for condition in conditions.iter_mut() {
                condition.col_id.get_or_insert_with(|| column.clone());
            }
        }
        children.push(FilterNode::try_from(&raw)?);
    }

    if children.len() == 1 {
        Ok(children.pop())
    } else {
        Ok(Some(FilterNode::Compound {
            op: CompoundOp::And,
            children,
        }))
    }
}

fn column_for<'a>(table: &'a Table, name: &str) -> Result<&'a Column, FilterError> {
    table
        .column(name)
        .ok_or_else(|| FilterError::UnknownColumn(name.to_string()))
}

/// Evaluate `node` over the candidate `rows` (positions into `table`),
/// returning the surviving positions.
pub fn matching_rows(table: &Table, node: &FilterNode, rows: &[usize]) -> Result<Vec<usize>, FilterError> {
    match node {
        FilterNode::Leaf { column, predicate } => {
            let column = column_for(table, column)?;
            Ok(rows
                .iter()
                .copied()
                .filter(|&row| {
                    column
                        .get(row)
                        .map(|cell| predicate.matches(cell))
                        .unwrap_or(false)
                })
                .collect())
        }
        FilterNode::Compound {
            op: CompoundOp::And,
            children,
        } => {
            let mut current = rows.to_vec();
            for child in children {
                current = matching_rows(table, child, &current)?;
            }
            Ok(current)
        }
        FilterNode::Compound {
            op: CompoundOp::Or,
            children,
        } => {
            let mut seen = HashSet::new();
            let mut union = Vec::new();
            for child in children {
                for row in matching_rows(table, child, rows)? {
                    if seen.insert(row) {
                        union.push(row);
                    }
                }
            }
            Ok(union)
        }
    }
}

/// Filter a table, producing the matching rows as a new table.
pub fn apply_filter(table: &Table, node: &FilterNode) -> Result<Table, PipelineError> {
    let all: Vec<usize> = (0..table.len()).collect();
    let rows = matching_rows(table, node, &all)?;
    log::debug!("filter kept {} of {} rows", rows.len(), table.len());
    Ok(table.take(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_json(
            "sample".to_string(),
            r#"[
                {"name": "alpha", "kind": "x", "n": 1,    "ok": true},
                {"name": "beta",  "kind": "y", "n": 5,    "ok": false},
                {"name": "gamma", "kind": "x", "n": 10,   "ok": true},
                {"name": "",      "kind": "z", "n": null, "ok": null},
                {"name": "alphabet", "kind": "y", "n": 7, "ok": false}
            ]"#,
        )
        .unwrap()
    }

    fn ids(table: &Table) -> Vec<i64> {
        table
            .column("uniqid")
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect()
    }

    fn run(table: &Table, model: JsonValue) -> Result<Vec<i64>, PipelineError> {
        let node = parse_filter_model(&model)?.expect("non-empty model");
        apply_filter(table, &node).map(|t| ids(&t))
    }

    #[test]
    fn test_text_operators() {
        let t = sample();
        let leaf = |op: &str, v: &str| json!({"colId": "name", "filterType": "text", "type": op, "filter": v});
        assert_eq!(run(&t, leaf("contains", "alpha")).unwrap(), vec![0, 4]);
        assert_eq!(run(&t, leaf("notContains", "alpha")).unwrap(), vec![1, 2, 3]);
        assert_eq!(run(&t, leaf("startsWith", "al")).unwrap(), vec![0, 4]);
        assert_eq!(run(&t, leaf("endsWith", "a")).unwrap(), vec![0, 1, 2]);
        assert_eq!(run(&t, leaf("notEndsWith", "a")).unwrap(), vec![3, 4]);
        assert_eq!(run(&t, leaf("equals", "beta")).unwrap(), vec![1]);
        assert_eq!(run(&t, leaf("notEqual", "beta")).unwrap(), vec![0, 2, 3, 4]);
        assert_eq!(run(&t, leaf("contains", "ALPHA")).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_blank_treats_empty_string_as_blank() {
        let t = sample();
        let blank = json!({"colId": "name", "filterType": "text", "type": "blank"});
        let not_blank = json!({"colId": "name", "filterType": "text", "type": "notBlank"});
        assert_eq!(run(&t, blank).unwrap(), vec![3]);
        assert_eq!(run(&t, not_blank).unwrap(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_number_operators() {
        let t = sample();
        let leaf = |op: &str, v: f64| json!({"colId": "n", "filterType": "number", "type": op, "filter": v});
        assert_eq!(run(&t, leaf("equals", 5.0)).unwrap(), vec![1]);
        assert_eq!(run(&t, leaf("notEqual", 5.0)).unwrap(), vec![0, 2, 4]);
        assert_eq!(run(&t, leaf("greaterThan", 5.0)).unwrap(), vec![2, 4]);
        assert_eq!(run(&t, leaf("greaterThanOrEqual", 5.0)).unwrap(), vec![1, 2, 4]);
        assert_eq!(run(&t, leaf("lessThan", 5.0)).unwrap(), vec![0]);
        assert_eq!(run(&t, leaf("lessThanOrEqual", 5.0)).unwrap(), vec![0, 1]);

        let range = json!({"colId": "n", "filterType": "number", "type": "inRange", "filter": 5, "filterTo": 10});
        assert_eq!(run(&t, range).unwrap(), vec![1, 2, 4]);

        let blank = json!({"colId": "n", "filterType": "number", "type": "blank"});
        assert_eq!(run(&t, blank).unwrap(), vec![3]);
    }

    #[test]
    fn test_number_compares_numerically_not_textually() {
        let t = sample();
        // "10" < "5" as text, but not as numbers
        let model = json!({"colId": "n", "filterType": "number", "type": "greaterThan", "filter": "5"});
        assert_eq!(run(&t, model).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_boolean_filter() {
        let t = sample();
        let model = json!({"colId": "ok", "filterType": "boolean", "type": "true"});
        assert_eq!(run(&t, model).unwrap(), vec![0, 2]);
        let model = json!({"colId": "ok", "filterType": "boolean", "filter": false});
        assert_eq!(run(&t, model).unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_or_unions_in_first_seen_order() {
        let t = sample();
        let model = json!({
            "filterType": "join",
            "type": "OR",
            "conditions": [
                {"colId": "n", "filterType": "number", "type": "greaterThan", "filter": 6},
                {"colId": "kind", "filterType": "text", "type": "equals", "filter": "x"}
            ]
        });
        // first child yields 2, 4; second adds 0 (2 already seen)
        assert_eq!(run(&t, model).unwrap(), vec![2, 4, 0]);
    }

    #[test]
    fn test_and_is_sequential_narrowing() {
        let t = sample();
        let a = json!({"colId": "kind", "filterType": "text", "type": "notEqual", "filter": "z"});
        let b = json!({"colId": "n", "filterType": "number", "type": "lessThan", "filter": 8});
        let both = json!({"filterType": "join", "type": "AND", "conditions": [a.clone(), b.clone()]});

        let step = apply_filter(&t, &parse_filter_model(&a).unwrap().unwrap()).unwrap();
        let step = apply_filter(&step, &parse_filter_model(&b).unwrap().unwrap()).unwrap();
        assert_eq!(run(&t, both).unwrap(), ids(&step));
    }

    #[test]
    fn test_nested_compound() {
        let t = sample();
        let model = json!({
            "filterType": "join",
            "type": "AND",
            "conditions": [
                {"colId": "name", "filterType": "text", "type": "notBlank"},
                {
                    "filterType": "join",
                    "type": "OR",
                    "conditions": [
                        {"colId": "kind", "filterType": "text", "type": "equals", "filter": "y"},
                        {"colId": "n", "filterType": "number", "type": "equals", "filter": 1}
                    ]
                }
            ]
        });
        assert_eq!(run(&t, model).unwrap(), vec![1, 4, 0]);
    }

    #[test]
    fn test_column_keyed_model() {
        let t = sample();
        let model = json!({
            "kind": {"filterType": "text", "type": "equals", "filter": "y"},
            "n": {"filterType": "number", "type": "greaterThan", "filter": 6}
        });
        assert_eq!(run(&t, model).unwrap(), vec![4]);
    }

    #[test]
    fn test_empty_models() {
        assert_eq!(parse_filter_model(&JsonValue::Null).unwrap(), None);
        assert_eq!(parse_filter_model(&json!({})).unwrap(), None);
    }

    #[test]
    fn test_errors() {
        let t = sample();
        let unknown_col = json!({"colId": "nope", "filterType": "text", "type": "equals", "filter": "a"});
        assert_eq!(
            run(&t, unknown_col),
            Err(PipelineError::Filter(FilterError::UnknownColumn("nope".to_string())))
        );

        let unknown_op = json!({"colId": "name", "filterType": "text", "type": "like", "filter": "a"});
        assert!(matches!(
            parse_filter_model(&unknown_op),
            Err(FilterError::UnknownOperator { .. })
        ));

        let no_to = json!({"colId": "n", "filterType": "number", "type": "inRange", "filter": 1});
        assert!(matches!(
            parse_filter_model(&no_to),
            Err(FilterError::MissingOperand { .. })
        ));

        let bad_join = json!({"type": "XOR", "conditions": []});
        assert_eq!(
            parse_filter_model(&bad_join),
            Err(FilterError::UnknownCompound("XOR".to_string()))
        );

        let date = json!({"colId": "name", "filterType": "date", "type": "equals"});
        assert!(matches!(
            parse_filter_model(&date),
            Err(FilterError::UnknownFilterType(_))
        ));
    }
}
