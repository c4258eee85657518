pub mod types;
pub mod fragment_log;
pub mod graph;
pub mod audit;
pub mod report;

pub use types::*;
pub use fragment_log::*;
pub use graph::*;
pub use audit::*;
pub use report::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provenance log not found: {0}")]
    LogNotFound(PathBuf),

    #[error("Malformed provenance record at line {line}: {reason}")]
    LogFormat { line: usize, reason: String },

    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Unsupported report format: {0} (expected \"text\" or \"json\")")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
