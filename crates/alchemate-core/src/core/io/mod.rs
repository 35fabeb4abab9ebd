//! Readers for the files a simulation backend leaves in its output directory.

pub mod convergence;
pub mod matrix;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Invalid value '{value}' on line {line} of '{path}'")]
    Value {
        path: String,
        line: u64,
        value: String,
    },
    #[error("Unexpected shape in '{path}': {message}")]
    Shape { path: String, message: String },
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn open(path: &Path) -> Result<std::fs::File, ReadError> {
    std::fs::File::open(path).map_err(|e| ReadError::Io {
        path: display_path(path),
        source: e,
    })
}
