//! Error taxonomy for table and progress bar operations.
//!
//! Every error is raised synchronously by the call that violated the
//! contract. Nothing is retried internally.

use std::io;

use thiserror::Error;

/// Errors surfaced by [`ProgressTable`](crate::table::ProgressTable) and its
/// progress bars.
#[derive(Debug, Error)]
pub enum TableError {
    /// A mutation was attempted after `close()`.
    #[error("table is closed; no further updates are accepted")]
    TableClosed,

    /// An explicit row index points past the stored rows.
    #[error("row index {index} out of range for a table with {len} rows")]
    RowIndexOutOfRange { index: i64, len: usize },

    /// A style or theme description contained unrecognised words.
    #[error("unknown {kind} style '{description}'. Available: {available}")]
    UnknownStyle {
        kind: &'static str,
        description: String,
        available: String,
    },

    /// A color description contained unrecognised words.
    #[error("unknown color '{name}'. Available: {available}")]
    UnknownColor { name: String, available: String },

    /// Malformed row/column region addressing.
    #[error("bad index: {0}")]
    BadIndex(String),

    /// A column was read before it was declared.
    #[error("column '{name}' not in [{available}]")]
    UnknownColumn { name: String, available: String },

    #[error("unknown aggregate '{name}'. Available: none, mean, sum, max, min")]
    UnknownAggregate { name: String },

    #[error("unknown alignment '{name}'. Available: left, center, right")]
    UnknownAlignment { name: String },

    /// A numeric aggregate received a value it cannot combine.
    #[error("column '{column}' aggregates numbers but received a non-numeric value")]
    NonNumeric { column: String },

    /// Writing to an output sink failed.
    #[error("failed to write table output: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TableError>;

// ============================================================================
// TESTS
// ============================================================================
