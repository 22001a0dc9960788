use crate::forecast::error::ForecastError;
use crate::observations::error::ObservationError;
use crate::session::error::SessionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeteoFranceError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Observation(#[from] ObservationError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Failed to build the HTTP client")]
    HttpClient(#[source] reqwest::Error),
}
