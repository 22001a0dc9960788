mod error;
mod forecast;
mod meteofrance;
mod observations;
mod session;
mod utils;

#[cfg(test)]
mod test_utils;

pub use error::MeteoFranceError;
pub use meteofrance::*;

pub use session::credential::{Credentials, API_KEY_ENV, APPLICATION_ID_ENV, TOKEN_ENV};
pub use session::error::SessionError;
pub use session::fault::{ExceptionReport, ServiceFault, INVALID_JWT_MARKER};
pub use session::manager::{
    SessionConfig, SessionManager, EXPIRED_TOKEN_CODE, MISSING_DATA_CODE, PARAMETER_ERROR_CODE,
    SUCCESS_CODE, TOKEN_URL,
};
pub use session::store::{default_token_cache_dir, FileStore, MemoryStore, TokenStore};
pub use session::token_cache::{TokenCache, TokenRecord, DEFAULT_TOKEN_TTL_SECS};
pub use session::transport::{
    query_params, QueryParams, RawResponse, ReqwestTransport, Transport, TransportError,
};

pub use forecast::client::{ForecastClient, DEFAULT_HEIGHT, DEFAULT_LAT, DEFAULT_LONG, DEFAULT_TIME};
pub use forecast::error::ForecastError;
pub use forecast::model::{
    Model, ModelConfig, Precision, Territory, AROME_TERRITORIES, ARPEGE_TERRITORIES,
};

pub use observations::client::{stations_from_frame, ObservationsClient, OBSERVATIONS_BASE_URL};
pub use observations::error::ObservationError;
pub use observations::locate_station::{StationFilter, StationLocator};
pub use observations::station::{LatLon, Station};
