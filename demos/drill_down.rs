/// Drill-Down Example
///
/// This example demonstrates:
/// - Loading a dataset from JSON records
/// - Serving the root group level with an aggregation
/// - Drilling one level deeper and reading the diagnostics
/// - Reaching the leaf rows of a fully drilled path
/// - A malformed request falling back to the raw rows

use rowmodel::{handle_view, Table, ViewOptions, ViewRequest};
use serde_json::json;

fn request(value: serde_json::Value) -> ViewRequest {
    serde_json::from_value(value).unwrap()
}

fn main() {
    println!("=== Row Model Drill-Down Example ===\n");

    // 1. Load a findings table
    let table = Table::from_json(
        "findings".to_string(),
        r#"[
            {"block": "core", "check": "timing", "slack": -0.12, "waiver": ""},
            {"block": "core", "check": "timing", "slack": -0.30, "waiver": ""},
            {"block": "core", "check": "power",  "slack":  0.05, "waiver": ""},
            {"block": "io",   "check": "timing", "slack": -0.02, "waiver": ""},
            {"block": "io",   "check": "drc",    "slack":  0.00, "waiver": ""}
        ]"#,
    )
    .unwrap();
    println!("1. Loaded {} rows: {:?}\n", table.len(), table.column_names());

    let options = ViewOptions::default();
    let dims = json!([{"id": "block"}, {"id": "check"}]);

    // 2. Root level: one row per block
    let root = handle_view(
        &table,
        &request(json!({
            "rowGroupCols": dims,
            "groupKeys": [],
            "valueCols": [{"id": "slack", "aggFunc": "min"}],
            "sortModel": [{"colId": "block", "sort": "desc"}],
            "startRow": 0,
            "endRow": 50
        })),
        &options,
    );
    println!("2. Root level ({} groups, {})", root.page.row_count, root.counters.summary());
    for row in &root.page.row_data {
        println!("   {}", row);
    }

    // 3. One level down
    let drilled = handle_view(
        &table,
        &request(json!({
            "rowGroupCols": dims,
            "groupKeys": ["core"],
            "startRow": 0,
            "endRow": 50
        })),
        &options,
    );
    println!("\n3. Drilled into 'core' ({})", drilled.counters.summary());
    for row in &drilled.page.row_data {
        println!("   {}", row);
    }

    // 4. Full depth: leaf rows come back with group = false
    let leaves = handle_view(
        &table,
        &request(json!({
            "rowGroupCols": dims,
            "groupKeys": ["core", "timing"],
            "filterModel": {"colId": "slack", "filterType": "number", "type": "lessThan", "filter": 0},
            "startRow": 0,
            "endRow": 50
        })),
        &options,
    );
    println!("\n4. Leaves of core/timing ({})", leaves.counters.summary());
    for row in &leaves.page.row_data {
        println!("   {}", row);
    }

    // 5. Unknown column in the filter: the raw rows are served instead
    let fallback = handle_view(
        &table,
        &request(json!({
            "filterModel": {"colId": "missing", "filterType": "text", "type": "contains", "filter": "x"},
            "startRow": 0,
            "endRow": 2
        })),
        &options,
    );
    println!(
        "\n5. Fallback page: {} of {} rows (fell back: {})",
        fallback.page.row_data.len(),
        fallback.page.row_count,
        fallback.fell_back
    );

    println!("\n=== Example Complete ===");
}
