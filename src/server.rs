/// HTTP server exposing the row model to a grid client
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::column::{json_to_column_value, ColumnValue};
use crate::columns::default_col_def;
use crate::table::Table;
use crate::messages::{
    ColumnsResponse, CommandResponse, DatasetCommand, ErrorResponse, HideSupersededRequest,
    ServerDataRequest, ServerDataResponse,
};
use crate::propagation::EditEvent;
use crate::session::Session;

/// Shared server state. Requests are served one at a time per session.
pub struct AppState {
    session: Mutex<Session>,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        AppState {
            session: Mutex::new(session),
        }
    }

    /// A panicked handler cannot leave a half-applied mutation behind, so a
    /// poisoned lock is still safe to use.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Grid data request handler
async fn server_data(state: web::Data<AppState>, body: web::Json<ServerDataRequest>) -> HttpResponse {
    let outcome = state.session().handle_view(body.into_inner().request);
    HttpResponse::Ok().json(ServerDataResponse {
        response: outcome.page,
        counter_info: outcome.counters.summary(),
    })
}

/// Cell edit handler. Failed edits are reported, never swallowed.
async fn edit(state: web::Data<AppState>, body: web::Json<EditEvent>) -> HttpResponse {
    match state.session().apply_edit(&body) {
        Ok(receipt) => HttpResponse::Ok().json(receipt),
        Err(err) => {
            log::warn!("edit rejected: {}", err);
            HttpResponse::UnprocessableEntity().json(ErrorResponse::new(err))
        }
    }
}

async fn columns(state: web::Data<AppState>) -> HttpResponse {
    let mut session = state.session();
    let defs = session.column_defs();
    HttpResponse::Ok().json(ColumnsResponse {
        column_defs: defs.as_ref().clone(),
        default_col_def: default_col_def(),
        generation: session.generation(),
    })
}

async fn hide_superseded(
    state: web::Data<AppState>,
    body: web::Json<HideSupersededRequest>,
) -> HttpResponse {
    state.session().set_hide_superseded(body.hide);
    HttpResponse::Ok().json(serde_json::json!({ "hide": body.hide }))
}

fn json_row(row: HashMap<String, serde_json::Value>) -> Result<HashMap<String, ColumnValue>, String> {
    row.into_iter()
        .map(|(name, value)| match json_to_column_value(&value) {
            Some(cell) => Ok((name, cell)),
            None => Err(format!("unsupported value for column '{}'", name)),
        })
        .collect()
}

/// The table a concat or join command brings in: a file when `path` is
/// set, else the inline records.
fn incoming_table(path: Option<String>, rows: Vec<serde_json::Value>) -> Result<Table, String> {
    match path {
        Some(path) => Table::from_path(std::path::Path::new(&path)).map_err(|e| e.to_string()),
        None => {
            let text = serde_json::Value::Array(rows).to_string();
            Table::from_json("inline".to_string(), &text).map_err(|e| e.to_string())
        }
    }
}

fn run_command(session: &mut Session, command: DatasetCommand) -> Result<usize, String> {
    match command {
        DatasetCommand::InsertRows { position, rows } => {
            let rows = rows.into_iter().map(json_row).collect::<Result<Vec<_>, _>>()?;
            session.insert_rows(position, rows).map_err(|e| e.to_string())
        }
        DatasetCommand::DeleteVisibleRows => session.delete_visible_rows().map_err(|e| e.to_string()),
        DatasetCommand::AddColumn { name, default } => {
            let default = json_to_column_value(&default)
                .ok_or_else(|| format!("unsupported default for column '{}'", name))?;
            session.add_column(&name, default).map(|_| 0).map_err(|e| e.to_string())
        }
        DatasetCommand::DropColumn { name } => session.drop_column(&name).map(|_| 0).map_err(|e| e.to_string()),
        DatasetCommand::RenameColumn { from, to } => {
            session.rename_column(&from, &to).map(|_| 0).map_err(|e| e.to_string())
        }
        DatasetCommand::Concat {
            path,
            rows,
            source_column,
        } => {
            let other = incoming_table(path, rows)?;
            session
                .concat(&other, source_column.as_deref())
                .map_err(|e| e.to_string())
        }
        DatasetCommand::Join {
            path,
            rows,
            left_key,
            right_key,
            how,
            suffix,
        } => {
            let other = incoming_table(path, rows)?;
            session
                .join(&other, &left_key, &right_key, how, &suffix)
                .map_err(|e| e.to_string())
        }
    }
}

/// Structural dataset operations
async fn dataset_command(state: web::Data<AppState>, body: web::Json<DatasetCommand>) -> HttpResponse {
    let mut session = state.session();
    match run_command(&mut session, body.into_inner()) {
        Ok(affected) => HttpResponse::Ok().json(CommandResponse {
            affected,
            generation: session.generation(),
        }),
        Err(err) => {
            log::warn!("dataset command rejected: {}", err);
            HttpResponse::BadRequest().json(ErrorResponse::new(err))
        }
    }
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let session = state.session();
    let snapshot = session.snapshot();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "rows": snapshot.len(),
        "generation": session.generation(),
    }))
}

/// Register all routes. Shared by [`run_server`] and handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/serverData", web::post().to(server_data))
        .route("/api/edit", web::post().to(edit))
        .route("/api/columns", web::get().to(columns))
        .route("/api/hide-superseded", web::post().to(hide_superseded))
        .route("/api/dataset", web::post().to(dataset_command))
        .route("/health", web::get().to(health_check));
}

/// Start the HTTP server
pub async fn run_server(state: web::Data<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    log::info!("row model server listening on http://{}:{}", host, port);
    log::info!("grid data: POST http://{}:{}/api/serverData", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
