use crate::session::error::SessionError;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Invalid model configuration: {0}")]
    InvalidModelConfig(String),

    #[error("Unknown territory '{0}'")]
    UnknownTerritory(String),

    #[error("Request to {url} failed with status {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to create coverage cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write coverage cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),
}
