//! The seam between the client and the network.
//!
//! [`HttpTransport`] is the production implementation on top of `reqwest`; connection pooling,
//! TLS and DNS are entirely its concern. [`crate::testing::MockTransport`] replays scripted
//! outcomes for tests.
use std::{error::Error, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode, Url,
};
use serde_json::Value;
use thiserror::Error;

use crate::codec::{self, CodecError};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// A single logical HTTP request. Retries resend the same value unchanged.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Upper bound for one attempt, independent of any retries.
    pub timeout: Duration,
}

impl Request {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn with_headers(self, headers: HeaderMap) -> Self {
        Self { headers, ..self }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(self, body: Value) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The body parsed as JSON, an empty body being `null`.
    pub fn json(&self) -> Result<Value, CodecError> {
        codec::parse_body(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A failure where no HTTP response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] BoxError),
    #[error("Request timed out: {0}")]
    Timeout(#[source] BoxError),
    #[error("Request failed: {0}")]
    Other(#[source] BoxError),
}

impl TransportError {
    /// Connection failures and timeouts, i.e. the request may never have reached the service.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.into())
        } else if error.is_connect() || error.is_request() {
            Self::Connect(error.into())
        } else {
            Self::Other(error.into())
        }
    }
}

/// Sends one attempt of a [`Request`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| TransportError::Other(error.into()))?;
        Ok(Self { client })
    }
}

impl From<reqwest::Client> for HttpTransport {
    fn from(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(Response::new(status, body.to_vec()))
    }
}
