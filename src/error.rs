/// Error types for the row model engines.
///
/// Each engine owns its own error enum so callers can tell a malformed filter
/// from a failed edit. The orchestrator folds the view-side errors into
/// [`PipelineError`]; edit errors are always surfaced to the caller.

use thiserror::Error;

/// Errors raised by the table primitives (column lookup, row access, typing).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("column '{0}' is reserved")]
    ReservedColumn(String),

    #[error("row {index} out of range [0, {len})")]
    RowOutOfRange { index: usize, len: usize },

    #[error("column '{column}' is not nullable")]
    NotNullable { column: String },

    #[error("type mismatch in column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("missing value for column '{0}'")]
    MissingValue(String),

    #[error("column '{column}' has {got} values, table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
}

/// Errors raised while loading a dataset from CSV or JSON.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input was empty")]
    EmptyInput,

    #[error("header row is empty")]
    EmptyHeader,

    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported json value for column '{0}'")]
    UnsupportedJsonValue(String),

    #[error("expected an array of objects")]
    NotAnArrayOfObjects,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the filter engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("filter node has neither 'colId' nor 'conditions'")]
    MalformedNode,

    #[error("unknown filter type '{0}'")]
    UnknownFilterType(String),

    #[error("unknown {filter_type} operator '{operator}'")]
    UnknownOperator {
        filter_type: String,
        operator: String,
    },

    #[error("unknown compound operator '{0}'")]
    UnknownCompound(String),

    #[error("filter references unknown column '{0}'")]
    UnknownColumn(String),

    #[error("operator '{operator}' requires an operand")]
    MissingOperand { operator: String },

    #[error("operand for '{operator}' is not a {expected}")]
    InvalidOperand { operator: String, expected: String },
}

/// Errors raised by the sort engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SortError {
    #[error("sort references unknown column '{0}'")]
    UnknownColumn(String),

    #[error("unknown sort direction '{0}'")]
    UnknownDirection(String),
}

/// Errors raised by the group/aggregation engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupError {
    #[error("unknown aggregation function '{0}'")]
    UnknownAggregation(String),

    #[error("grouping references unknown column '{0}'")]
    UnknownColumn(String),

    #[error("drill path has {keys} keys but only {dimensions} dimensions are grouped")]
    DrillPathTooLong { keys: usize, dimensions: usize },

    #[error("unsupported drill key {0}")]
    InvalidDrillKey(String),

    #[error("cannot apply '{func}' to non-numeric column '{column}'")]
    NonNumericAggregate { func: String, column: String },
}

/// Errors raised by the mutation/propagation engine. None of these leave the
/// dataset modified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropagationError {
    #[error("propagation rule references missing column '{0}'")]
    MissingRuleColumn(String),

    #[error("edited column '{0}' does not exist")]
    UnknownColumn(String),

    #[error("no row with identity {0}")]
    RowNotFound(i64),

    #[error("row {0} is a summary row and cannot be edited")]
    SummaryRow(i64),

    #[error("column '{0}' is not editable")]
    ProtectedColumn(String),

    #[error("value {value} cannot be stored in column '{column}'")]
    InvalidValue { column: String, value: String },

    #[error("dataset has no identity column")]
    MissingIdentity,

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Any failure inside the Filter -> Sort -> Group -> Sort pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Sort(#[from] SortError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },

    #[error("tolerance decimals {decimals} out of range (max {max})")]
    ToleranceDecimals { decimals: u32, max: u32 },

    #[error("tolerance epsilon {0} must be finite and non-negative")]
    ToleranceEpsilon(f64),
}
