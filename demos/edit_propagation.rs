/// Edit Propagation Example
///
/// This example demonstrates:
/// - Configuring a session with business keys for the status column
/// - Editing one row and propagating to every matching row
/// - Reading the route back to the edited row's group
/// - Hiding superseded rows after a status change

use rowmodel::config::SessionConfig;
use rowmodel::{EditEvent, Session, Table, ViewRequest};
use serde_json::json;

fn main() {
    println!("=== Row Model Edit Propagation Example ===\n");

    let mut session = Session::new(SessionConfig {
        editor: Some("reviewer".to_string()),
        business_keys: vec!["check".to_string(), "slack".to_string()],
        ..SessionConfig::default()
    });

    // Same finding reported by two runs, with float noise on the slack
    session
        .load(
            Table::from_json(
                "findings".to_string(),
                r#"[
                    {"run": "r1", "check": "timing", "slack": -0.1200000001, "waiver": "", "user": ""},
                    {"run": "r2", "check": "timing", "slack": -0.12,         "waiver": "", "user": ""},
                    {"run": "r2", "check": "timing", "slack": -0.30,         "waiver": "", "user": ""},
                    {"run": "r1", "check": "power",  "slack":  0.05,         "waiver": "", "user": ""}
                ]"#,
            )
            .unwrap(),
        )
        .unwrap();
    println!("1. Loaded {} rows (generation {})\n", session.snapshot().len(), session.generation());

    // 2. The client is looking at the runs drilled into r1
    let view: ViewRequest = serde_json::from_value(json!({
        "rowGroupCols": [{"id": "run"}],
        "groupKeys": ["r1"],
        "startRow": 0,
        "endRow": 100
    }))
    .unwrap();
    let page = session.handle_view(view);
    println!("2. Viewing run r1: {} rows", page.page.row_count);

    // 3. Waive the first timing finding
    let edited = page.page.row_data[0]["uniqid"].as_i64().unwrap_or_default();
    let receipt = session.apply_edit(&EditEvent {
        column: "waiver".to_string(),
        new_value: json!("Known issue."),
        edited_row_identity: edited,
        group: false,
    });
    match receipt {
        Ok(receipt) => println!(
            "3. Edit affected {} rows, route {:?}, generation {}",
            receipt.affected, receipt.route, receipt.generation
        ),
        Err(err) => println!("3. Edit rejected: {}", err),
    }
    for row in session.snapshot().to_records() {
        println!("   {}", row);
    }

    // 4. Waivers ending in '.' are superseded and can be hidden
    session.set_hide_superseded(true);
    let root: ViewRequest = serde_json::from_value(json!({
        "rowGroupCols": [{"id": "run"}],
        "startRow": 0,
        "endRow": 100
    }))
    .unwrap();
    let outcome = session.handle_view(root);
    println!("\n4. With superseded rows hidden ({}):", outcome.counters.summary());
    for row in &outcome.page.row_data {
        println!("   {}", row);
    }

    // 5. Summary rows cannot be edited
    let rejected = session.apply_edit(&EditEvent {
        column: "waiver".to_string(),
        new_value: json!("x"),
        edited_row_identity: 0,
        group: true,
    });
    println!("\n5. Editing a summary row: {:?}", rejected.err().map(|e| e.to_string()));

    println!("\n=== Example Complete ===");
}
