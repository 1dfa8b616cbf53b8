/// Column metadata for the grid.
///
/// Definitions are a pure function of the table's shape plus the session's
/// editing settings. [`ColumnDefCache`] keeps the last list keyed by the
/// session's change generation so it is rebuilt only after a change.

use crate::column::ColumnKind;
use crate::table::{Table, IDENTITY_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// Status values with a highlight colour. Superseded (`.`-suffixed) values
/// keep the colour of their base value.
const STATUS_STYLES: [(&str, &str); 5] = [
    ("Waiver", "lightskyblue"),
    ("Waiver.", "lightskyblue"),
    ("Fixed", "limegreen"),
    ("Fixed.", "limegreen"),
    ("Error", "lightcoral"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub header_name: String,
    pub field: String,
    /// `text` or `number`
    pub cell_data_type: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide: bool,
    pub editable: bool,
    pub cell_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkbox_selection: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_style: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDefOptions {
    /// Always editable, rendered as text with status highlighting.
    pub status_column: String,
    pub editable_columns: Vec<String>,
    pub hidden_columns: Vec<String>,
}

/// Grid-wide defaults applied to every column.
pub fn default_col_def() -> JsonValue {
    json!({
        "filter": true,
        "sortable": true,
        "resizable": true,
        "enableValue": true,
        "enablePivot": true,
        "enableRowGroup": true,
    })
}

fn status_cell_style(status_column: &str) -> JsonValue {
    let mut conditions: Vec<JsonValue> = STATUS_STYLES
        .iter()
        .map(|(value, colour)| {
            json!({
                "condition": format!("params.data.{} == '{}'", status_column, value),
                "style": {"backgroundColor": colour},
            })
        })
        .collect();
    conditions.push(json!({
        "condition": format!("params.data.{} == ''", status_column),
        "style": {},
    }));
    json!({ "styleConditions": conditions })
}

/// Build the definitions for every column except the identity column.
pub fn column_defs(table: &Table, options: &ColumnDefOptions) -> Vec<ColumnDef> {
    table
        .columns()
        .iter()
        .filter(|c| c.name() != IDENTITY_COLUMN)
        .map(|column| {
            let name = column.name();
            let is_status = name == options.status_column;
            let numeric = column.kind() == ColumnKind::Numeric && !is_status;
            let editable = is_status || options.editable_columns.iter().any(|c| c == name);
            ColumnDef {
                header_name: name.to_string(),
                field: name.to_string(),
                cell_data_type: if numeric { "number" } else { "text" }.to_string(),
                column_type: numeric.then(|| "rightAligned".to_string()),
                hide: options.hidden_columns.iter().any(|c| c == name),
                editable,
                cell_class: if editable { "text-dark" } else { "text-secondary" }.to_string(),
                checkbox_selection: is_status.then(|| json!({"function": "params.data.group != true"})),
                cell_style: is_status.then(|| status_cell_style(name)),
            }
        })
        .collect()
}

/// Memoised column definitions keyed by change generation.
#[derive(Debug, Default)]
pub struct ColumnDefCache {
    generation: Option<u64>,
    defs: Arc<Vec<ColumnDef>>,
}

impl ColumnDefCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached list when `generation` matches, else rebuild it.
    pub fn get_or_build(
        &mut self,
        generation: u64,
        build: impl FnOnce() -> Vec<ColumnDef>,
    ) -> Arc<Vec<ColumnDef>> {
        if self.generation != Some(generation) {
            log::debug!("rebuilding column definitions for generation {}", generation);
            self.defs = Arc::new(build());
            self.generation = Some(generation);
        }
        Arc::clone(&self.defs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_json(
            "s".to_string(),
            r#"[{"name": "a", "size": 1.5, "waiver": "", "count": 3}]"#,
        )
        .unwrap()
    }

    fn options() -> ColumnDefOptions {
        ColumnDefOptions {
            status_column: "waiver".to_string(),
            editable_columns: vec!["name".to_string()],
            hidden_columns: vec!["count".to_string()],
        }
    }

    #[test]
    fn test_defs_skip_identity_and_classify() {
        let defs = column_defs(&sample(), &options());
        let fields: Vec<&str> = defs.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "size", "waiver", "count"]);

        assert_eq!(defs[0].cell_data_type, "text");
        assert!(defs[0].editable);
        assert_eq!(defs[0].cell_class, "text-dark");

        assert_eq!(defs[1].cell_data_type, "number");
        assert_eq!(defs[1].column_type.as_deref(), Some("rightAligned"));
        assert!(!defs[1].editable);
        assert_eq!(defs[1].cell_class, "text-secondary");

        assert!(defs[3].hide);
    }

    #[test]
    fn test_status_column_def() {
        let defs = column_defs(&sample(), &options());
        let status = &defs[2];
        assert!(status.editable);
        assert_eq!(status.cell_data_type, "text");
        assert_eq!(
            status.checkbox_selection,
            Some(json!({"function": "params.data.group != true"}))
        );
        let style = status.cell_style.as_ref().unwrap();
        assert_eq!(
            style["styleConditions"][4],
            json!({"condition": "params.data.waiver == 'Error'", "style": {"backgroundColor": "lightcoral"}})
        );

        let wire = serde_json::to_value(&defs[0]).unwrap();
        assert_eq!(wire["headerName"], json!("name"));
        assert!(wire.get("hide").is_none());
        assert!(wire.get("type").is_none());
    }

    #[test]
    fn test_cache_rebuilds_on_generation_change() {
        let mut cache = ColumnDefCache::new();
        let mut builds = 0;
        let table = sample();
        let opts = options();

        for generation in [0, 0, 1, 1, 1] {
            cache.get_or_build(generation, || {
                builds += 1;
                column_defs(&table, &opts)
            });
        }
        assert_eq!(builds, 2);
    }
}
