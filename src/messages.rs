/// HTTP message types for grid client and server communication
use crate::columns::ColumnDef;
use crate::combine::JoinHow;
use crate::pipeline::{ResultPage, ViewRequest};
use crate::session::InsertPosition;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Body of `POST /api/serverData`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDataRequest {
    pub request: ViewRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDataResponse {
    pub response: ResultPage,
    /// e.g. `"Filtered: 1,204 Groupby: 12 (A: 3)"`; the client reads it as
    /// `counter_info`.
    #[serde(rename = "counter_info")]
    pub counter_info: String,
}

/// Body of `GET /api/columns`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnsResponse {
    pub column_defs: Vec<ColumnDef>,
    pub default_col_def: JsonValue,
    pub generation: u64,
}

/// Body of `POST /api/hide-superseded`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HideSupersededRequest {
    pub hide: bool,
}

/// Structural operations posted to `POST /api/dataset`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatasetCommand {
    /// Insert rows at the top or bottom
    InsertRows {
        position: InsertPosition,
        #[serde(default)]
        rows: Vec<HashMap<String, JsonValue>>,
    },

    /// Delete every row selected by the active filter
    DeleteVisibleRows,

    /// Add a column filled with a default value
    AddColumn {
        name: String,
        #[serde(default)]
        default: JsonValue,
    },

    DropColumn { name: String },

    RenameColumn { from: String, to: String },

    /// Append rows read from `path`, or given inline as `rows`
    Concat {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        rows: Vec<JsonValue>,
        #[serde(default)]
        source_column: Option<String>,
    },

    /// Join a table read from `path`, or given inline as `rows`
    Join {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        rows: Vec<JsonValue>,
        left_key: String,
        right_key: String,
        how: JoinHow,
        #[serde(default = "default_join_suffix")]
        suffix: String,
    },
}

fn default_join_suffix() -> String {
    crate::combine::DEFAULT_JOIN_SUFFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Rows inserted or deleted; 0 for column operations
    pub affected: usize,
    pub generation: u64,
}

/// Any rejected request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        ErrorResponse {
            error: error.to_string(),
        }
    }
}
