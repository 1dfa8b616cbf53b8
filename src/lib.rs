/// rowmodel - Server-Side Row Model Engine
///
/// Serves paginated, filtered, sorted and hierarchically grouped views of an
/// in-memory dataset to a grid client, and applies cell edits that propagate
/// to every row representing the same logical item.
///
/// The view pipeline is Filter -> Sort -> Group -> Sort; see
/// [`pipeline::handle_view`]. Edits go through [`propagation::apply_edit`].
/// [`Session`] ties both to one owned dataset snapshot.

pub mod error;
pub mod column;
pub mod table;
pub mod filter;
pub mod sort;
pub mod group;
pub mod pipeline;
pub mod propagation;
pub mod columns;
pub mod changeset;
pub mod combine;
pub mod config;
pub mod session;

pub use column::{classify, Column, ColumnKind, ColumnType, ColumnValue};
pub use table::{Schema, Table};
pub use error::{
    ConfigError, FilterError, GroupError, LoadError, PipelineError, PropagationError, SortError,
    TableError,
};
pub use filter::FilterNode;
pub use sort::{SortKey, SortOrder};
pub use group::{AggFunc, DrillKey, GroupOptions, GroupRequest};
pub use pipeline::{handle_view, ResultPage, RowCounters, ViewOptions, ViewRequest};
pub use propagation::{apply_edit, EditEvent, PropagationConfig, Tolerance};
pub use columns::{ColumnDef, ColumnDefCache};
pub use changeset::{Changeset, DatasetChange};
pub use combine::JoinHow;
pub use config::Config;
pub use session::{InsertPosition, Session};

// HTTP server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod server;
