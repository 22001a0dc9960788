//! The main entry point: one authenticated session shared by the forecast and
//! observation clients.

use crate::error::MeteoFranceError;
use crate::forecast::client::ForecastClient;
use crate::forecast::model::{ModelConfig, Precision, Territory};
use crate::observations::client::ObservationsClient;
use crate::session::credential::Credentials;
use crate::session::manager::{SessionConfig, SessionManager};
use crate::session::store::{FileStore, TokenStore};
use crate::session::transport::{ReqwestTransport, Transport};
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Client for the Météo-France public API.
///
/// Holds the [`SessionManager`] (credentials, token cache, retry on expiry)
/// and the artifact cache directory used for coverages and the station list.
/// Endpoint clients created from it share the session.
///
/// # Examples
///
/// ```no_run
/// use meteofrance::{MeteoFrance, MeteoFranceError};
///
/// # fn main() -> Result<(), MeteoFranceError> {
/// // Reads METEOFRANCE_API_KEY / METEOFRANCE_TOKEN / METEOFRANCE_APPLICATION_ID.
/// let client = MeteoFrance::from_env()?;
///
/// let arome = client.arome()?;
/// let capabilities = arome.capabilities()?;
/// println!("{} bytes of capabilities", capabilities.len());
/// # Ok(())
/// # }
/// ```
pub struct MeteoFrance {
    session: Arc<SessionManager>,
    cache_dir: PathBuf,
}

#[bon]
impl MeteoFrance {
    /// Builds a client from explicit settings.
    ///
    /// # Arguments
    ///
    /// * `.api_key(String)` - Static API key. Takes precedence over everything else.
    /// * `.token(String)` - A bearer token to use as is.
    /// * `.application_id(String)` - Base64 client credentials used to obtain
    ///   and renew tokens.
    /// * `.cache_dir(PathBuf)` - Where coverages and the station list go.
    ///   Defaults to the system cache directory.
    /// * `.token_cache_dir(PathBuf)` - Where the token record is kept. Defaults to
    ///   `<temp dir>/meteofrance_rs/token`.
    /// * `.token_store(Arc<dyn TokenStore>)` - Replaces the file-based token cache.
    /// * `.token_ttl(chrono::Duration)` - Assumed token lifetime. Defaults to one hour.
    /// * `.timeout(std::time::Duration)` - HTTP timeout of the default transport.
    /// * `.transport(Arc<dyn Transport>)` - Replaces the default `reqwest` transport.
    ///
    /// # Errors
    ///
    /// * [`MeteoFranceError::Session`] when no credential is given or the token
    ///   exchange fails.
    /// * [`MeteoFranceError::CacheDirResolution`] / [`MeteoFranceError::CacheDirCreation`]
    ///   for cache directory problems.
    /// * [`MeteoFranceError::HttpClient`] if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meteofrance::MeteoFrance;
    /// use std::time::Duration;
    ///
    /// # fn main() -> Result<(), meteofrance::MeteoFranceError> {
    /// let client = MeteoFrance::builder()
    ///     .application_id("base64-client-credentials")
    ///     .cache_dir("/tmp/meteofrance".into())
    ///     .timeout(Duration::from_secs(30))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn new(
        #[builder(into)] api_key: Option<String>,
        #[builder(into)] token: Option<String>,
        #[builder(into)] application_id: Option<String>,
        cache_dir: Option<PathBuf>,
        token_cache_dir: Option<PathBuf>,
        token_store: Option<Arc<dyn TokenStore>>,
        token_ttl: Option<chrono::Duration>,
        timeout: Option<std::time::Duration>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, MeteoFranceError> {
        let credentials = Credentials {
            api_key,
            token,
            application_id,
        };
        Self::from_credentials(
            credentials,
            cache_dir,
            token_cache_dir,
            token_store,
            token_ttl,
            timeout,
            transport,
        )
    }

    /// Builds a client with credentials from the `METEOFRANCE_*` environment
    /// variables and every other setting at its default.
    pub fn from_env() -> Result<Self, MeteoFranceError> {
        Self::from_credentials(Credentials::from_env(), None, None, None, None, None, None)
    }

    fn from_credentials(
        credentials: Credentials,
        cache_dir: Option<PathBuf>,
        token_cache_dir: Option<PathBuf>,
        token_store: Option<Arc<dyn TokenStore>>,
        token_ttl: Option<chrono::Duration>,
        timeout: Option<std::time::Duration>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, MeteoFranceError> {
        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => get_cache_dir().map_err(MeteoFranceError::CacheDirResolution)?,
        };
        ensure_cache_dir_exists(&cache_dir)
            .map_err(|e| MeteoFranceError::CacheDirCreation(cache_dir.clone(), e))?;

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => {
                let reqwest = match timeout {
                    Some(timeout) => ReqwestTransport::with_timeout(timeout),
                    None => ReqwestTransport::new(),
                };
                Arc::new(reqwest.map_err(MeteoFranceError::HttpClient)?)
            }
        };

        let store: Option<Arc<dyn TokenStore>> = token_store.or_else(|| {
            token_cache_dir.map(|dir| Arc::new(FileStore::new(dir)) as Arc<dyn TokenStore>)
        });
        let config = SessionConfig::builder()
            .maybe_token_ttl(token_ttl)
            .maybe_store(store)
            .build();

        let session = SessionManager::new(credentials, transport, config)?;
        Ok(Self {
            session: Arc::new(session),
            cache_dir,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// AROME 0.01° over metropolitan France.
    pub fn arome(&self) -> Result<ForecastClient, MeteoFranceError> {
        self.forecast(ModelConfig::arome(Precision::P001, Territory::France)?)
    }

    /// ARPEGE over Europe (0.1°).
    pub fn arpege(&self) -> Result<ForecastClient, MeteoFranceError> {
        self.forecast(ModelConfig::arpege(Territory::Europe)?)
    }

    /// A forecast client for any valid model configuration.
    ///
    /// ```no_run
    /// use meteofrance::{MeteoFrance, ModelConfig, Precision, Territory};
    ///
    /// # fn main() -> Result<(), meteofrance::MeteoFranceError> {
    /// let client = MeteoFrance::from_env()?;
    /// let antilles = client.forecast(ModelConfig::arome(Precision::P0025, Territory::Antil)?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn forecast(&self, config: ModelConfig) -> Result<ForecastClient, MeteoFranceError> {
        Ok(ForecastClient::new(
            self.session.clone(),
            config,
            self.cache_dir.clone(),
        ))
    }

    pub fn observations(&self) -> ObservationsClient {
        ObservationsClient::new(self.session.clone(), self.cache_dir.clone())
    }
}
