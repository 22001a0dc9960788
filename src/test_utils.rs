//! Shared fixtures for unit tests: a scripted [`Transport`] that records every request.

use crate::session::transport::{RawResponse, Transport, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Answers requests with queued responses, in order. Running out of responses
/// is a transport error, so a test notices unexpected extra requests.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = RawResponse>) -> Self {
        let transport = Self::new();
        for response in responses {
            transport.push(response);
        }
        transport
    }

    pub fn push(&self, response: RawResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn answer(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            query: query.to_vec(),
            headers: headers.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::new(url, "no scripted response left"))
    }
}

impl Transport for ScriptedTransport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        self.answer(Method::GET, url, query, headers)
    }

    fn post(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        self.answer(Method::POST, url, query, headers)
    }
}

pub(crate) fn response(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> RawResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    RawResponse::new(StatusCode::from_u16(status).unwrap(), headers, body.into())
}

pub(crate) fn token_response(token: &str) -> RawResponse {
    response(
        200,
        "application/json",
        format!(r#"{{"access_token":"{token}","scope":"default","token_type":"Bearer","expires_in":3600}}"#),
    )
}

pub(crate) fn expired_token_response() -> RawResponse {
    response(
        401,
        "application/json",
        r#"{"code":"900901","message":"Invalid Credentials","description":"Invalid JWT token. Make sure you have provided the correct security credentials"}"#,
    )
}

pub(crate) fn ok_text(body: &str) -> RawResponse {
    response(200, "text/plain", body)
}
