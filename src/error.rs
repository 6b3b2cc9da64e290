use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// A single failed transfer attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid status code: {0}")]
    Status(StatusCode),

    #[error("Failed to write archive: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status(StatusCode::NOT_FOUND))
    }
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("No progress recorded yet at {}", .0.display())]
    Missing(PathBuf),

    #[error("Progress file {} does not hold a number: {content:?}", .path.display())]
    Malformed { path: PathBuf, content: String },

    #[error("Progress file I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No starting number given and no previous download recorded; pass --start")]
    NoStartingPoint,

    #[error("Failed to read progress: {0}")]
    StateRead(#[source] ProgressError),

    #[error("Failed to save progress: {0}")]
    StateWrite(#[source] ProgressError),
}
