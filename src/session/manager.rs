//! The authenticated session shared by every endpoint client.
//!
//! A [`SessionManager`] runs in exactly one of three modes, picked at
//! construction from the supplied [`Credentials`]:
//!
//! * **API key**: a static `apikey` header, no token handling at all.
//! * **Bearer token**: the given token is sent as `Authorization: Bearer ...`.
//! * **Application id**: a token is obtained through the client-credentials
//!   exchange, cached in a [`TokenStore`] for its lifetime (one hour by
//!   default), and renewed once when the gateway reports it expired.

use crate::session::credential::{AuthMode, Credentials};
use crate::session::error::SessionError;
use crate::session::fault::{is_expired_token, ExceptionReport, ServiceFault};
use crate::session::store::{FileStore, TokenStore};
use crate::session::token_cache::{TokenCache, TokenRecord, DEFAULT_TOKEN_TTL_SECS};
use crate::session::transport::{query_params, RawResponse, Transport};
use bon::bon;
use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const TOKEN_URL: &str = "https://portail-api.meteofrance.fr/token";

const API_KEY_HEADER: &str = "apikey";

pub const SUCCESS_CODE: StatusCode = StatusCode::OK;
pub const PARAMETER_ERROR_CODE: StatusCode = StatusCode::BAD_REQUEST;
pub const EXPIRED_TOKEN_CODE: StatusCode = StatusCode::UNAUTHORIZED;
pub const MISSING_DATA_CODE: StatusCode = StatusCode::NOT_FOUND;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Where tokens come from, how long they are trusted and where they are kept.
#[derive(Clone)]
pub struct SessionConfig {
    pub token_url: String,
    pub token_ttl: Duration,
    pub store: Arc<dyn TokenStore>,
}

#[bon]
impl SessionConfig {
    /// Builds a configuration; every field has a default.
    ///
    /// * `.token_url(String)`: token endpoint. Defaults to [`TOKEN_URL`].
    /// * `.token_ttl(Duration)`: assumed token lifetime. Defaults to one hour.
    /// * `.store(Arc<dyn TokenStore>)`: token storage. Defaults to a
    ///   [`FileStore`] under the system temp directory.
    ///
    /// ```
    /// use meteofrance::{MemoryStore, SessionConfig};
    /// use std::sync::Arc;
    ///
    /// let config = SessionConfig::builder()
    ///     .token_ttl(chrono::Duration::minutes(50))
    ///     .store(Arc::new(MemoryStore::new()))
    ///     .build();
    /// assert_eq!(config.token_ttl.num_minutes(), 50);
    /// ```
    #[builder]
    pub fn new(
        #[builder(into)] token_url: Option<String>,
        token_ttl: Option<Duration>,
        store: Option<Arc<dyn TokenStore>>,
    ) -> Self {
        Self {
            token_url: token_url.unwrap_or_else(|| TOKEN_URL.to_string()),
            token_ttl: token_ttl.unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_TTL_SECS)),
            store: store.unwrap_or_else(|| Arc::new(FileStore::default())),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Where [`SessionManager::obtain_token`] may take a token from.
enum TokenSource<'a> {
    /// A fresh cached record, else a new exchange.
    CacheFirst,
    /// The gateway rejected this bearer. Another thread may already have
    /// replaced it; otherwise exchange, ignoring the cached record.
    ReplaceRejected(Option<&'a str>),
}

#[derive(Default)]
struct SessionState {
    headers: HeaderMap,
    bearer: Option<String>,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    token_url: String,
    mode: AuthMode,
    cache: TokenCache,
    state: Mutex<SessionState>,
    // Held for the whole read-exchange-write sequence so two threads never
    // exchange credentials at the same time.
    token_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sensitive(value: &str) -> Result<HeaderValue, SessionError> {
    let mut value = HeaderValue::from_str(value).map_err(SessionError::InvalidCredential)?;
    value.set_sensitive(true);
    Ok(value)
}

impl SessionManager {
    /// Resolves the credentials and makes the session ready to send requests.
    ///
    /// With only an application id, this performs [`Self::acquire_token`]
    /// (which may hit the network if no fresh token is cached).
    ///
    /// # Errors
    ///
    /// * [`SessionError::Configuration`] if no credential is usable.
    /// * [`SessionError::Authentication`] if the token exchange fails.
    /// * [`SessionError::Transport`] if the token endpoint is unreachable.
    pub fn new(
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let mode = credentials.into_mode()?;
        let manager = Self {
            transport,
            token_url: config.token_url,
            mode,
            cache: TokenCache::new(config.store, config.token_ttl),
            state: Mutex::new(SessionState::default()),
            token_lock: Mutex::new(()),
        };

        match &manager.mode {
            AuthMode::ApiKey(key) => {
                debug!("using api key");
                let mut state = lock(&manager.state);
                state
                    .headers
                    .insert(HeaderName::from_static(API_KEY_HEADER), sensitive(key)?);
            }
            AuthMode::Bearer {
                token: Some(token), ..
            } => {
                debug!("using token");
                manager.apply_bearer(token)?;
            }
            AuthMode::Bearer { token: None, .. } => {
                debug!("using application id");
                manager.acquire_token()?;
            }
        }
        Ok(manager)
    }

    pub fn uses_api_key(&self) -> bool {
        matches!(self.mode, AuthMode::ApiKey(_))
    }

    /// The bearer token currently attached to requests, if any.
    pub fn bearer_token(&self) -> Option<String> {
        lock(&self.state).bearer.clone()
    }

    /// A copy of the headers sent with every data request.
    pub fn headers(&self) -> HeaderMap {
        lock(&self.state).headers.clone()
    }

    /// Returns a bearer token, reusing the cached one while it is younger than
    /// the configured TTL, and attaches it to the session.
    ///
    /// On a cache miss the application id is exchanged at the token endpoint
    /// and the new token is written back to the cache with the current time.
    ///
    /// # Errors
    ///
    /// [`SessionError::Authentication`] when the session has no application id
    /// or the endpoint does not answer with an `access_token`.
    pub fn acquire_token(&self) -> Result<String, SessionError> {
        self.obtain_token(TokenSource::CacheFirst)
    }

    fn obtain_token(&self, source: TokenSource<'_>) -> Result<String, SessionError> {
        let application_id = self.mode.application_id().ok_or_else(|| {
            SessionError::Authentication(
                "no application id available to request a token".to_string(),
            )
        })?;

        let _guard = lock(&self.token_lock);

        match source {
            TokenSource::CacheFirst => {
                if let Some(token) = self.cache.fresh_token(Utc::now())? {
                    debug!("reading token from cache");
                    self.apply_bearer(&token)?;
                    return Ok(token);
                }
            }
            TokenSource::ReplaceRejected(rejected) => {
                if let Some(current) = self.bearer_token() {
                    if Some(current.as_str()) != rejected {
                        debug!("token already renewed by another request");
                        return Ok(current);
                    }
                }
            }
        }

        info!("requesting a new token from {}", self.token_url);
        let token = self.exchange(application_id)?;
        self.cache.save(&TokenRecord::new(token.clone(), Utc::now()))?;
        self.apply_bearer(&token)?;
        Ok(token)
    }

    fn exchange(&self, application_id: &str) -> Result<String, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            sensitive(&format!("Basic {application_id}"))?,
        );
        let query = query_params([("grant_type", "client_credentials")]);

        let response = self.transport.post(&self.token_url, &query, &headers)?;
        if !response.is_success() {
            warn!("token endpoint answered {}", response.status);
            return Err(SessionError::Authentication(format!(
                "token endpoint answered {}",
                response.status
            )));
        }

        let parsed: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            SessionError::Authentication(format!("unreadable token endpoint response: {e}"))
        })?;
        match parsed.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(SessionError::Authentication(
                "token endpoint response has no access_token".to_string(),
            )),
        }
    }

    fn apply_bearer(&self, token: &str) -> Result<(), SessionError> {
        let value = sensitive(&format!("Bearer {token}"))?;
        let mut state = lock(&self.state);
        state.headers.insert(AUTHORIZATION, value);
        state.bearer = Some(token.to_string());
        Ok(())
    }

    /// Also returns the bearer the request was sent with.
    fn send_get(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<(RawResponse, Option<String>), SessionError> {
        let (headers, bearer) = {
            let state = lock(&self.state);
            (state.headers.clone(), state.bearer.clone())
        };
        let response = self.transport.get(url, params, &headers)?;
        Ok((response, bearer))
    }

    /// Sends an authenticated GET and classifies the answer.
    ///
    /// An expired token is renewed and the request replayed once. A second
    /// expiry in a row is not retried.
    ///
    /// # Errors
    ///
    /// * [`SessionError::Authentication`] when the token is still rejected
    ///   after one renewal, or cannot be renewed.
    /// * [`SessionError::Parameter`] on status 400, with the gateway fault.
    /// * [`SessionError::MissingData`] on status 404, with the OWS exception.
    /// * [`SessionError::Transport`] when no response was received.
    ///
    /// Any other status, successful or not, is returned as is.
    pub fn execute_get(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<RawResponse, SessionError> {
        debug!("GET {}", url);
        let (mut response, sent_bearer) = self.send_get(url, params)?;

        if is_expired_token(&response) {
            info!("token expired, requesting a new one");
            self.obtain_token(TokenSource::ReplaceRejected(sent_bearer.as_deref()))?;
            (response, _) = self.send_get(url, params)?;
            if is_expired_token(&response) {
                return Err(SessionError::Authentication(
                    "token expired but could not refresh".to_string(),
                ));
            }
        }

        let status = response.status;
        if status == SUCCESS_CODE {
            debug!("request successful");
        } else if status == PARAMETER_ERROR_CODE {
            error!("parameter error for {}", url);
            return Err(SessionError::Parameter(ServiceFault::parse(
                &response.text(),
            )));
        } else if status == MISSING_DATA_CODE {
            warn!("no data for {}", url);
            return Err(SessionError::MissingData(ExceptionReport::parse(
                &response.text(),
            )));
        }
        Ok(response)
    }
}
