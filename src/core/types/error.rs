use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Malformed mutation info in {path}: {reason}")]
    MutationInfo { path: PathBuf, reason: String },
    #[error("Mutation trees do not match: {0}")]
    InconsistentMutationTrees(String),
    #[error("Packed file {0} no longer contains the file boundary marker")]
    MissingDelimiter(PathBuf),
    #[error("{0}")]
    Custom(String),
}

pub type AppResult<T> = Result<T, AppError>;
