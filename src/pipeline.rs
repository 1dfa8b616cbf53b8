/// View request orchestration.
///
/// [`handle_view`] is the single entry point for grid data requests. It runs
/// Filter -> Sort -> Group -> Sort over a borrowed snapshot and slices the
/// result into the requested window. Any pipeline error is logged and the
/// request is answered from the unfiltered, ungrouped snapshot instead.

use crate::error::PipelineError;
use crate::filter::{apply_filter, parse_filter_model, FilterNode};
use crate::group::{apply_group, format_count, GroupOptions, GroupRequest, RowGroupCol, ValueCol};
use crate::sort::{apply_sort, parse_sort_model, SortKey, SortModelEntry};
use crate::table::Table;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Server-side row model request as sent by the grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewRequest {
    pub filter_model: Option<JsonValue>,
    #[serde(deserialize_with = "null_as_default")]
    pub sort_model: Vec<SortModelEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub row_group_cols: Vec<RowGroupCol>,
    #[serde(deserialize_with = "null_as_default")]
    pub group_keys: Vec<JsonValue>,
    #[serde(deserialize_with = "null_as_default")]
    pub value_cols: Vec<ValueCol>,
    #[serde(deserialize_with = "null_as_default")]
    pub start_row: usize,
    pub end_row: Option<usize>,
}

/// A [`ViewRequest`] with every part validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    pub filter: Option<FilterNode>,
    pub sort: Vec<SortKey>,
    pub group: GroupRequest,
}

impl ViewRequest {
    pub fn parse(&self) -> Result<ParsedRequest, PipelineError> {
        let filter = match &self.filter_model {
            Some(model) => parse_filter_model(model)?,
            None => None,
        };
        Ok(ParsedRequest {
            filter,
            sort: parse_sort_model(&self.sort_model)?,
            group: GroupRequest::from_wire(&self.row_group_cols, &self.group_keys, &self.value_cols)?,
        })
    }

    /// Active grouping dimensions.
    pub fn dimensions(&self) -> Vec<String> {
        self.row_group_cols.iter().map(|c| c.id.clone()).collect()
    }
}

/// One window of the post-pipeline table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub row_data: Vec<JsonValue>,
    pub row_count: usize,
}

/// Display counters reported next to the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounters {
    /// Row count after filtering, empty when no filter is active.
    pub filtered: String,
    /// Group engine diagnostics.
    pub groupby: String,
}

impl RowCounters {
    /// `"Filtered: 4 Groupby: 2"`, leaving out counters that are empty.
    pub fn summary(&self) -> String {
        [("Filtered", &self.filtered), ("Groupby", &self.groupby)]
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| format!("{}: {}", label, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub group: GroupOptions,
    /// End row used when a request has none.
    pub page_size: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        ViewOptions {
            group: GroupOptions::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOutcome {
    pub page: ResultPage,
    pub counters: RowCounters,
    /// Set when the page came from the fallback snapshot.
    pub fell_back: bool,
}

/// Filter -> Sort -> Group -> Sort. Returns the full derived table.
pub fn run_pipeline(
    table: &Table,
    request: &ViewRequest,
    options: &ViewOptions,
) -> Result<(Table, RowCounters), PipelineError> {
    let parsed = request.parse()?;
    let dims = &parsed.group.dimensions;
    let mut counters = RowCounters::default();

    let filtered = match &parsed.filter {
        Some(node) => {
            let filtered = apply_filter(table, node)?;
            counters.filtered = format_count(filtered.len());
            filtered
        }
        None => table.clone(),
    };
    let sorted = apply_sort(&filtered, &parsed.sort, dims)?;
    let grouped = apply_group(&sorted, &parsed.group, &options.group)?;
    counters.groupby = grouped.diagnostics;
    let result = apply_sort(&grouped.table, &parsed.sort, dims)?;
    Ok((result, counters))
}

fn page_of(table: &Table, request: &ViewRequest, options: &ViewOptions) -> ResultPage {
    let end = request.end_row.unwrap_or(options.page_size);
    ResultPage {
        row_data: table.slice(request.start_row, end).to_records(),
        row_count: table.len(),
    }
}

/// Answer a view request. Never fails: pipeline errors are logged and the
/// page is cut from `table` as-is.
pub fn handle_view(table: &Table, request: &ViewRequest, options: &ViewOptions) -> ViewOutcome {
    log::debug!(
        "view request rows [{}, {:?}) groups {:?} keys {:?}",
        request.start_row,
        request.end_row,
        request.dimensions(),
        request.group_keys
    );
    match run_pipeline(table, request, options) {
        Ok((result, counters)) => ViewOutcome {
            page: page_of(&result, request, options),
            counters,
            fell_back: false,
        },
        Err(err) => {
            log::warn!("view pipeline failed, serving unfiltered data: {}", err);
            ViewOutcome {
                page: page_of(table, request, options),
                counters: RowCounters::default(),
                fell_back: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_json(
            "sample".to_string(),
            r#"[
                {"cat": "A", "value": 1},
                {"cat": "A", "value": 2},
                {"cat": "B", "value": 3},
                {"cat": "B", "value": 4},
                {"cat": "B", "value": 5}
            ]"#,
        )
        .unwrap()
    }

    fn request(value: JsonValue) -> ViewRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_deserializes_nulls() {
        let req = request(json!({
            "filterModel": null,
            "sortModel": null,
            "rowGroupCols": [],
            "groupKeys": null,
            "valueCols": [],
            "startRow": 0,
            "endRow": 100
        }));
        assert_eq!(req.end_row, Some(100));
        assert!(req.sort_model.is_empty());
        assert_eq!(req.parse().unwrap(), ParsedRequest::default());
    }

    #[test]
    fn test_plain_page() {
        let t = sample();
        let out = handle_view(&t, &request(json!({"startRow": 1, "endRow": 3})), &ViewOptions::default());
        assert!(!out.fell_back);
        assert_eq!(out.page.row_count, 5);
        assert_eq!(out.page.row_data.len(), 2);
        assert_eq!(out.page.row_data[0]["value"], json!(2));
        assert_eq!(out.counters, RowCounters::default());
    }

    #[test]
    fn test_group_then_sort_by_dimension() {
        let t = sample();
        let req = request(json!({
            "rowGroupCols": [{"id": "cat"}],
            "valueCols": [{"id": "value", "aggFunc": "sum"}],
            "sortModel": [{"colId": "cat", "sort": "desc"}],
            "startRow": 0,
            "endRow": 100
        }));
        let out = handle_view(&t, &req, &ViewOptions::default());
        assert_eq!(out.page.row_count, 2);
        // largest group first
        assert_eq!(out.page.row_data[0]["cat"], json!("B"));
        assert_eq!(out.page.row_data[0]["childCount"], json!(3));
        assert_eq!(out.counters.groupby, "2");
    }

    #[test]
    fn test_filter_counter_and_row_count_after_pipeline() {
        let t = sample();
        let req = request(json!({
            "filterModel": {"colId": "value", "filterType": "number", "type": "greaterThan", "filter": 1},
            "startRow": 0,
            "endRow": 2
        }));
        let out = handle_view(&t, &req, &ViewOptions::default());
        assert_eq!(out.page.row_count, 4);
        assert_eq!(out.page.row_data.len(), 2);
        assert_eq!(out.counters.filtered, "4");
        assert_eq!(out.counters.summary(), "Filtered: 4");
    }

    #[test]
    fn test_counter_summary_skips_empty_entries() {
        assert_eq!(RowCounters::default().summary(), "");
        let counters = RowCounters {
            filtered: "1,204".to_string(),
            groupby: "12 (A: 3)".to_string(),
        };
        assert_eq!(counters.summary(), "Filtered: 1,204 Groupby: 12 (A: 3)");
        let counters = RowCounters {
            filtered: String::new(),
            groupby: "2".to_string(),
        };
        assert_eq!(counters.summary(), "Groupby: 2");
    }

    #[test]
    fn test_any_stage_error_falls_back() {
        let t = sample();
        let plain = handle_view(&t, &request(json!({"startRow": 0, "endRow": 10})), &ViewOptions::default());

        for bad in [
            json!({"filterModel": {"colId": "missing", "filterType": "text", "type": "equals", "filter": "x"}}),
            json!({"sortModel": [{"colId": "value", "sort": "sideways"}]}),
            json!({"rowGroupCols": [{"id": "cat"}], "valueCols": [{"id": "value", "aggFunc": "median"}]}),
            json!({"rowGroupCols": [{"id": "nope"}]}),
        ] {
            let mut bad = bad;
            bad["startRow"] = json!(0);
            bad["endRow"] = json!(10);
            let out = handle_view(&t, &request(bad), &ViewOptions::default());
            assert!(out.fell_back);
            assert_eq!(out.page, plain.page);
        }
    }

    #[test]
    fn test_missing_end_row_uses_page_size() {
        let t = sample();
        let options = ViewOptions {
            page_size: 3,
            ..ViewOptions::default()
        };
        let out = handle_view(&t, &request(json!({})), &options);
        assert_eq!(out.page.row_data.len(), 3);
        assert_eq!(out.page.row_count, 5);
    }

    #[test]
    fn test_start_beyond_end() {
        let t = sample();
        let out = handle_view(&t, &request(json!({"startRow": 7, "endRow": 9})), &ViewOptions::default());
        assert!(out.page.row_data.is_empty());
        assert_eq!(out.page.row_count, 5);
    }
}
