//! FILENAME: pivot-engine/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PivotError {
    #[error("Invalid pivot configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unsupported pivot configuration version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid header pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Values matrix is {rows}x{columns}, headers require at least {expected_rows}x{expected_columns}")]
    MatrixShape {
        expected_rows: usize,
        expected_columns: usize,
        rows: usize,
        columns: usize,
    },
}

pub type Result<T> = std::result::Result<T, PivotError>;
