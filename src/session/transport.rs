//! The HTTP capability used by [`crate::SessionManager`].
//!
//! Requests are blocking: each call returns once the full body has been read.
//! [`ReqwestTransport`] is the production implementation; anything implementing
//! [`Transport`] can be swapped in (a recording fake in tests, a proxy-aware
//! client, ...).

use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Query parameters in send order. Keys may repeat (WCS `subset` for example).
pub type QueryParams = Vec<(String, String)>;

/// Builds [`QueryParams`] from borrowed pairs.
pub fn query_params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A request that never produced a response (connection refused, timeout, ...).
#[derive(Debug, Error)]
#[error("Network request failed for {url}")]
pub struct TransportError {
    pub url: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    pub fn new(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
        }
    }
}

pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError>;

    fn post(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<RawResponse, TransportError> {
        let response = request
            .send()
            .map_err(|e| TransportError::new(url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| TransportError::new(url, e))?
            .to_vec();
        debug!("{} answered {} with {} bytes", url, status, body.len());
        Ok(RawResponse::new(status, headers, body))
    }
}

impl Transport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        let request = self
            .client
            .get(url)
            .query(query)
            .headers(headers.clone());
        self.send(request, url)
    }

    fn post(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        let request = self
            .client
            .post(url)
            .query(query)
            .headers(headers.clone());
        self.send(request, url)
    }
}
