//! Error types for the replay library.

use thiserror::Error;

/// Main error type for replay operations.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The canonical JSON encoder could not serialize a column value.
    #[error("Encoding failed for {table}.{column} ({declared_type}): {message}")]
    EncodingFailure {
        table: String,
        column: String,
        declared_type: String,
        message: String,
    },

    /// A scalar value could not be coerced to its declared type.
    #[error("Invalid value for {table}.{column} ({declared_type}): {message}")]
    InvalidValue {
        table: String,
        column: String,
        declared_type: String,
        message: String,
    },

    /// Table is not present in the current schema snapshot (strict mode only)
    #[error("Table {0} is not present in the schema snapshot")]
    UnknownTable(String),

    /// Column is not present in the table schema (strict mode only)
    #[error("Column {column} is not present in table {table}")]
    UnknownColumn { table: String, column: String },

    /// Declared type has no normalization rule (strict mode only)
    #[error("Column {table}.{column} has unrecognized type '{declared_type}'")]
    UnrecognizedType {
        table: String,
        column: String,
        declared_type: String,
    },

    /// The same column name appears twice in one change event
    #[error("Column {column} appears more than once in change event for {table}")]
    DuplicateColumn { table: String, column: String },

    /// Update or delete without any key columns to build a predicate from
    #[error("Table {0} change has no identity columns - cannot build WHERE clause")]
    MissingIdentity(String),

    /// Canonical value has no representation in the selected wire format
    #[error("Column {column} ({declared_type}) cannot be written in {format} format")]
    UnsupportedWireType {
        column: String,
        declared_type: String,
        format: String,
    },

    /// A line of an event file could not be parsed
    #[error("Invalid change event on line {line}: {message}")]
    InvalidEvent { line: usize, message: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Write of a batch to the target failed
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Replay was cancelled (SIGINT, etc.)
    #[error("Replay cancelled")]
    Cancelled,
}

impl ReplayError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ReplayError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        ReplayError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Name of the column this error refers to, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            ReplayError::EncodingFailure { column, .. }
            | ReplayError::InvalidValue { column, .. }
            | ReplayError::UnknownColumn { column, .. }
            | ReplayError::UnrecognizedType { column, .. }
            | ReplayError::DuplicateColumn { column, .. }
            | ReplayError::UnsupportedWireType { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReplayError::Config(_) | ReplayError::Yaml(_) => 2,
            ReplayError::EncodingFailure { .. }
            | ReplayError::InvalidValue { .. }
            | ReplayError::UnknownTable(_)
            | ReplayError::UnknownColumn { .. }
            | ReplayError::UnrecognizedType { .. }
            | ReplayError::DuplicateColumn { .. }
            | ReplayError::MissingIdentity(_)
            | ReplayError::UnsupportedWireType { .. }
            | ReplayError::InvalidEvent { .. }
            | ReplayError::Json(_) => 3,
            ReplayError::Target(_) | ReplayError::Pool { .. } | ReplayError::Write { .. } => 4,
            ReplayError::Cancelled => 130,
            ReplayError::Io(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;
