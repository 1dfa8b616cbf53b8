/// Sort engine.
///
/// Orders a table by a list of [`SortKey`]s with a stable sort, so rows that
/// compare equal keep their previous relative order. Summary tables (those
/// carrying `childCount`) are sorted group-aware:
///
/// * if any requested key is a grouping dimension, rows are ordered by
///   `childCount` in the direction of the first such key and every other key
///   is ignored
/// * otherwise the keys are compared on their textual form
///
/// Raw rows silently skip keys whose column is absent.

use crate::column::ColumnValue;
use crate::error::{PipelineError, SortError};
use crate::table::{Table, AUTO_GROUP_COLUMN, CHILD_COUNT_COLUMN};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort order specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl SortOrder {
    pub fn parse(direction: &str) -> Result<Self, SortError> {
        match direction {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(SortError::UnknownDirection(other.to_string())),
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// A single sort key specifying a column and order
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        SortKey::new(column, SortOrder::Ascending)
    }

    pub fn descending(column: impl Into<String>) -> Self {
        SortKey::new(column, SortOrder::Descending)
    }

    pub fn new(column: impl Into<String>, order: SortOrder) -> Self {
        SortKey {
            column: column.into(),
            order,
        }
    }
}

/// One entry of the grid's `sortModel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortModelEntry {
    pub col_id: String,
    pub sort: String,
}

impl SortModelEntry {
    pub fn new(col_id: impl Into<String>, sort: impl Into<String>) -> Self {
        SortModelEntry {
            col_id: col_id.into(),
            sort: sort.into(),
        }
    }
}

/// Validate a sort model into keys, dropping the grid's auto group column.
pub fn parse_sort_model(entries: &[SortModelEntry]) -> Result<Vec<SortKey>, SortError> {
    entries
        .iter()
        .filter(|e| e.col_id != AUTO_GROUP_COLUMN)
        .map(|e| Ok(SortKey::new(e.col_id.clone(), SortOrder::parse(&e.sort)?)))
        .collect()
}

/// Typed comparison of two cells. Nulls go last in either direction;
/// mixed numeric cells compare as f64; any other mix compares as text.
fn compare_values(a: &ColumnValue, b: &ColumnValue, key: &SortKey) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let base = match (a, b) {
        (ColumnValue::Int64(a), ColumnValue::Int64(b)) => a.cmp(b),
        (ColumnValue::String(a), ColumnValue::String(b)) => a.cmp(b),
        (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a.cmp(b),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_text().cmp(&b.to_text()),
        },
    };
    key.order.apply(base)
}

/// Like [`compare_values`] but on the textual form of both cells.
fn compare_as_text(a: &ColumnValue, b: &ColumnValue, key: &SortKey) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (false, false) => key.order.apply(a.to_text().cmp(&b.to_text())),
        _ => compare_values(a, b, key),
    }
}

/// Stable multi-key sort. Every key column must exist.
pub fn sort_table(table: &Table, keys: &[SortKey]) -> Result<Table, PipelineError> {
    sort_with(table, keys, compare_values)
}

fn sort_with(
    table: &Table,
    keys: &[SortKey],
    compare: fn(&ColumnValue, &ColumnValue, &SortKey) -> Ordering,
) -> Result<Table, PipelineError> {
    if keys.is_empty() {
        return Ok(table.clone());
    }
    let columns = keys
        .iter()
        .map(|k| {
            table
                .column(&k.column)
                .map(|c| (c.values(), k))
                .ok_or_else(|| SortError::UnknownColumn(k.column.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<usize> = (0..table.len()).collect();
    // slice::sort_by is stable
    order.sort_by(|&a, &b| {
        for (values, key) in &columns {
            let cmp = compare(&values[a], &values[b], key);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
    Ok(table.take(&order)?)
}

/// Group-aware sort used by the view pipeline. `dimensions` are the active
/// grouping columns of the request.
pub fn apply_sort(table: &Table, keys: &[SortKey], dimensions: &[String]) -> Result<Table, PipelineError> {
    if keys.is_empty() {
        return Ok(table.clone());
    }

    if !dimensions.is_empty() && table.has_column(CHILD_COUNT_COLUMN) {
        let (group_keys, other_keys): (Vec<&SortKey>, Vec<&SortKey>) =
            keys.iter().partition(|k| dimensions.contains(&k.column));

        if let Some(first) = group_keys.first() {
            log::debug!("sorting summary rows by {} ({:?})", CHILD_COUNT_COLUMN, first.order);
            let by_size = SortKey::new(CHILD_COUNT_COLUMN, first.order);
            return sort_table(table, &[by_size]);
        }
        let other_keys: Vec<SortKey> = other_keys.into_iter().cloned().collect();
        return sort_with(table, &other_keys, compare_as_text);
    }

    let present: Vec<SortKey> = keys
        .iter()
        .filter(|k| table.has_column(&k.column))
        .cloned()
        .collect();
    sort_table(table, &present)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: &str) -> Table {
        Table::from_json("t".to_string(), json).unwrap()
    }

    fn column_text(table: &Table, name: &str) -> Vec<String> {
        table.column(name).unwrap().iter().map(|v| v.to_text()).collect()
    }

    #[test]
    fn test_parse_sort_model_drops_auto_column() {
        let entries = vec![
            SortModelEntry::new(AUTO_GROUP_COLUMN, "asc"),
            SortModelEntry::new("b", "desc"),
        ];
        assert_eq!(parse_sort_model(&entries).unwrap(), vec![SortKey::descending("b")]);
        assert_eq!(
            parse_sort_model(&[SortModelEntry::new("b", "up")]),
            Err(SortError::UnknownDirection("up".to_string()))
        );
    }

    #[test]
    fn test_raw_sort_multi_key_and_nulls_last() {
        let t = table(r#"[
            {"k": "b", "n": 2}, {"k": "a", "n": null}, {"k": "a", "n": 1}, {"k": "b", "n": 3}
        ]"#);
        let sorted = apply_sort(&t, &[SortKey::ascending("k"), SortKey::descending("n")], &[]).unwrap();
        assert_eq!(column_text(&sorted, "k"), vec!["a", "a", "b", "b"]);
        assert_eq!(column_text(&sorted, "n"), vec!["1", "", "3", "2"]);
    }

    #[test]
    fn test_raw_sort_skips_missing_columns() {
        let t = table(r#"[{"n": 2}, {"n": 1}]"#);
        let sorted = apply_sort(&t, &[SortKey::ascending("gone"), SortKey::ascending("n")], &[]).unwrap();
        assert_eq!(column_text(&sorted, "n"), vec!["1", "2"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let t = table(r#"[{"k": 1, "tag": "first"}, {"k": 0, "tag": "x"}, {"k": 1, "tag": "second"}]"#);
        let sorted = sort_table(&t, &[SortKey::ascending("k")]).unwrap();
        assert_eq!(column_text(&sorted, "tag"), vec!["x", "first", "second"]);
    }

    #[test]
    fn test_summary_sort_uses_first_group_key_direction() {
        let t = table(r#"[
            {"cat": "a", "sub": "z", "childCount": 2},
            {"cat": "b", "sub": "y", "childCount": 5},
            {"cat": "c", "sub": "x", "childCount": 1}
        ]"#);
        let dims = vec!["cat".to_string(), "sub".to_string()];

        let keys = vec![SortKey::descending("cat"), SortKey::ascending("sub")];
        let sorted = apply_sort(&t, &keys, &dims).unwrap();
        assert_eq!(column_text(&sorted, "childCount"), vec!["5", "2", "1"]);

        let keys = vec![SortKey::ascending("sub"), SortKey::descending("cat")];
        let sorted = apply_sort(&t, &keys, &dims).unwrap();
        assert_eq!(column_text(&sorted, "childCount"), vec!["1", "2", "5"]);
    }

    #[test]
    fn test_summary_sort_non_group_keys_compare_as_text() {
        let t = table(r#"[
            {"cat": "a", "v": 9, "childCount": 1},
            {"cat": "b", "v": 10, "childCount": 1},
            {"cat": "c", "v": 2, "childCount": 1}
        ]"#);
        let dims = vec!["cat".to_string()];
        let sorted = apply_sort(&t, &[SortKey::ascending("v")], &dims).unwrap();
        assert_eq!(column_text(&sorted, "v"), vec!["10", "2", "9"]);

        assert_eq!(
            apply_sort(&t, &[SortKey::ascending("gone")], &dims),
            Err(PipelineError::Sort(SortError::UnknownColumn("gone".to_string())))
        );
    }
}
