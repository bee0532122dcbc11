use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Extraction engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScryError>;
