use crate::session::fault::{ExceptionReport, ServiceFault};
use crate::session::transport::TransportError;
use reqwest::header::InvalidHeaderValue;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// None of api key, token or application id was supplied.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Credential cannot be used as an HTTP header value")]
    InvalidCredential(#[source] InvalidHeaderValue),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("The service rejected the request parameters: {0}")]
    Parameter(ServiceFault),

    #[error("The service has no data for this request: {0}")]
    MissingData(ExceptionReport),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to read token cache entry '{0}'")]
    TokenCacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write token cache entry '{0}'")]
    TokenCacheWrite(PathBuf, #[source] std::io::Error),
}

impl SessionError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, SessionError::Authentication(_))
    }
}
