//! Error types for schema synthesis and query translation.

use thiserror::Error;

/// Errors that abort a schema build, or reject use of a schema that is not
/// ready.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The adapter could not read the metadata snapshot.
    #[error("failed to read database metadata: {0}")]
    Metadata(#[from] anyhow::Error),

    /// No exposable table left after introspection.
    #[error("no tables found in database")]
    NoTables,

    /// An annotated link needs a join key but the table has no primary field.
    #[error("table {table} has annotated field groups but no primary field to join them on")]
    MissingPrimaryKey { table: String },

    /// The synthesized types could not be assembled into an executable schema.
    #[error("failed to assemble executable schema: {0}")]
    Finish(String),

    /// The schema is still building or its last build failed.
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),
}

/// Per-request errors turning arguments into SQL fragments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unknown field {field} on table {table}")]
    UnknownField { table: String, field: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("invalid pagination arguments: {0}")]
    Pagination(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

impl TranslateError {
    pub fn unknown_field(table: &str, field: &str) -> Self {
        TranslateError::UnknownField {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}
