/// Session state.
///
/// A `Session` owns the current dataset snapshot and everything derived from
/// it. View requests read a borrowed snapshot; every mutation builds a new
/// table and swaps it in whole, so a failed mutation leaves the session as
/// it was.

use crate::changeset::{Changeset, DatasetChange};
use crate::column::{Column, ColumnType, ColumnValue};
use crate::combine::{concat_tables, join_tables, JoinHow};
use crate::columns::{column_defs, ColumnDef, ColumnDefCache};
use crate::config::SessionConfig;
use crate::error::{LoadError, PipelineError, PropagationError, TableError};
use crate::filter::{matching_rows, parse_filter_model};
use crate::pipeline::{handle_view, RowCounters, ViewOutcome, ViewRequest};
use crate::propagation::{apply_edit, EditEvent};
use crate::table::{is_reserved, Schema, Table, IDENTITY_COLUMN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Where inserted rows go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Top,
    Bottom,
}

/// Result of a committed edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditReceipt {
    pub route: Vec<String>,
    pub affected: usize,
    pub generation: u64,
}

fn default_cell(column_type: ColumnType) -> ColumnValue {
    match column_type {
        ColumnType::Int64 => ColumnValue::Int64(0),
        ColumnType::Float64 => ColumnValue::Float64(0.0),
        ColumnType::String => ColumnValue::String(String::new()),
        ColumnType::Bool => ColumnValue::Bool(false),
    }
}

fn ensure_not_reserved(name: &str) -> Result<(), TableError> {
    if is_reserved(name) {
        Err(TableError::ReservedColumn(name.to_string()))
    } else {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Session {
    table: Arc<Table>,
    config: SessionConfig,
    hide_superseded: bool,
    active_request: ViewRequest,
    last_counters: RowCounters,
    changeset: Changeset,
    column_cache: ColumnDefCache,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let hide_superseded = config.hide_superseded;
        Session {
            table: Arc::new(Table::new("empty".to_string(), Schema::new(Vec::new()))),
            config,
            hide_superseded,
            active_request: ViewRequest::default(),
            last_counters: RowCounters::default(),
            changeset: Changeset::new(),
            column_cache: ColumnDefCache::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current dataset snapshot.
    pub fn snapshot(&self) -> Arc<Table> {
        Arc::clone(&self.table)
    }

    pub fn generation(&self) -> u64 {
        self.changeset.generation()
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    /// The last view request served.
    pub fn active_request(&self) -> &ViewRequest {
        &self.active_request
    }

    pub fn counters(&self) -> &RowCounters {
        &self.last_counters
    }

    pub fn hide_superseded(&self) -> bool {
        self.hide_superseded
    }

    pub fn set_hide_superseded(&mut self, hide: bool) {
        self.hide_superseded = hide;
    }

    fn commit(&mut self, table: Table, change: DatasetChange) -> u64 {
        self.table = Arc::new(table);
        self.changeset.record(change)
    }

    /// Replace the dataset. Identity is (re)assigned in current row order.
    pub fn load(&mut self, table: Table) -> Result<(), TableError> {
        let table = table.with_identity()?;
        log::info!(
            "loaded dataset '{}' ({} rows, {} columns)",
            table.name(),
            table.len(),
            table.columns().len()
        );
        let change = DatasetChange::Loaded {
            rows: table.len(),
            columns: table.columns().len(),
        };
        self.active_request = ViewRequest::default();
        self.commit(table, change);
        Ok(())
    }

    /// Load a `.json` array of objects or any delimited text file.
    pub fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        self.load(Table::from_path(path)?)?;
        Ok(())
    }

    /// Serve a view request and remember it as the active request.
    pub fn handle_view(&mut self, request: ViewRequest) -> ViewOutcome {
        let options = self.config.view_options(self.hide_superseded);
        let outcome = handle_view(&self.table, &request, &options);
        self.last_counters = outcome.counters.clone();
        self.active_request = request;
        outcome
    }

    /// Apply an edit against the active request's grouping.
    pub fn apply_edit(&mut self, event: &EditEvent) -> Result<EditReceipt, PropagationError> {
        let outcome = apply_edit(&self.table, event, &self.active_request, &self.config.propagation())?;
        let generation = self.commit(
            outcome.table,
            DatasetChange::CellsEdited {
                column: event.column.clone(),
                affected: outcome.affected,
                route: outcome.route.clone(),
            },
        );
        Ok(EditReceipt {
            route: outcome.route,
            affected: outcome.affected,
            generation,
        })
    }

    pub fn column_defs(&mut self) -> Arc<Vec<ColumnDef>> {
        let table = &self.table;
        let options = self.config.column_def_options();
        self.column_cache
            .get_or_build(self.changeset.generation(), || column_defs(table, &options))
    }

    /// Insert rows at the top or bottom. Unspecified cells get a type default
    /// (0, 0.0, "", false) and identity is renumbered.
    pub fn insert_rows(
        &mut self,
        position: InsertPosition,
        rows: Vec<HashMap<String, ColumnValue>>,
    ) -> Result<usize, TableError> {
        let mut table = (*self.table).clone();
        let at = match position {
            InsertPosition::Top => 0,
            InsertPosition::Bottom => table.len(),
        };
        let count = rows.len();
        for (offset, mut row) in rows.into_iter().enumerate() {
            if let Some(name) = row.keys().find(|k| is_reserved(k)) {
                return Err(TableError::ReservedColumn(name.clone()));
            }
            for column in table.columns() {
                if column.name() != IDENTITY_COLUMN && !row.contains_key(column.name()) {
                    row.insert(column.name().to_string(), default_cell(column.column_type()));
                }
            }
            row.insert(IDENTITY_COLUMN.to_string(), ColumnValue::Int64(-1));
            table.insert_row(at + offset, row)?;
        }
        let table = table.with_identity()?;
        log::info!("inserted {} rows at {:?}", count, position);
        self.commit(table, DatasetChange::RowsInserted { at, count });
        Ok(count)
    }

    /// Delete the rows the active request's filter selects; every row when
    /// no filter is active.
    pub fn delete_visible_rows(&mut self) -> Result<usize, PipelineError> {
        let all: Vec<usize> = (0..self.table.len()).collect();
        let doomed = match &self.active_request.filter_model {
            Some(model) => match parse_filter_model(model)? {
                Some(node) => matching_rows(&self.table, &node, &all)?,
                None => all,
            },
            None => all,
        };
        let mut table = (*self.table).clone();
        let count = table.delete_rows(&doomed)?;
        let table = table.with_identity()?;
        log::info!("deleted {} rows", count);
        self.commit(table, DatasetChange::RowsDeleted { count });
        Ok(count)
    }

    /// Add a column filled with `default`. A null default makes a text column.
    pub fn add_column(&mut self, name: &str, default: ColumnValue) -> Result<(), TableError> {
        ensure_not_reserved(name)?;
        if self.table.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        let column_type = match &default {
            ColumnValue::Int64(_) => ColumnType::Int64,
            ColumnValue::Float64(_) => ColumnType::Float64,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::String(_) | ColumnValue::Null => ColumnType::String,
        };
        let column = Column::filled(name, column_type, default, self.table.len())?;
        let table = (*self.table).clone().with_column(column)?;
        self.commit(table, DatasetChange::ColumnAdded { name: name.to_string() });
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<(), TableError> {
        ensure_not_reserved(name)?;
        let mut table = (*self.table).clone();
        table.drop_column(name)?;
        self.commit(table, DatasetChange::ColumnDropped { name: name.to_string() });
        Ok(())
    }

    /// Append the rows of `other`. Returns the number of rows appended.
    pub fn concat(&mut self, other: &Table, source_column: Option<&str>) -> Result<usize, TableError> {
        let table = concat_tables(&self.table, other, source_column)?.with_identity()?;
        let count = other.len();
        log::info!("appended {} rows from '{}'", count, other.name());
        self.commit(
            table,
            DatasetChange::Concatenated {
                source: other.name().to_string(),
                count,
            },
        );
        Ok(count)
    }

    /// Replace the dataset with its join against `other`. Returns the new
    /// row count.
    pub fn join(
        &mut self,
        other: &Table,
        left_key: &str,
        right_key: &str,
        how: JoinHow,
        suffix: &str,
    ) -> Result<usize, TableError> {
        let table = join_tables(&self.table, other, left_key, right_key, how, suffix)?.with_identity()?;
        let rows = table.len();
        log::info!("{:?} join with '{}' left {} rows", how, other.name(), rows);
        self.commit(
            table,
            DatasetChange::Joined {
                source: other.name().to_string(),
                how,
                rows,
            },
        );
        Ok(rows)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        ensure_not_reserved(from)?;
        ensure_not_reserved(to)?;
        let mut table = (*self.table).clone();
        table.rename_column(from, to)?;
        self.commit(
            table,
            DatasetChange::ColumnRenamed {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
        Ok(())
    }
}
