//! Helpers for testing code built on [`crate::Client`] without a running Ergon service.
//!
//! # Example
//!
//! ```
//! # use ergon::prelude::*;
//! use ergon::testing::MockTransport;
//! use reqwest::StatusCode;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let transport = MockTransport::new();
//! transport.expect_status(StatusCode::SERVICE_UNAVAILABLE);
//! transport.expect_json(StatusCode::OK, json!([{"id": "1", "subject": "email.send"}]));
//!
//! let client = Client::builder("https://ergon.example.com", "emails", "secret")
//!     .with_retry(RetryConfig::default().with_base_delay(std::time::Duration::ZERO))
//!     .build_with_transport(transport.clone())
//!     .unwrap();
//!
//! let jobs = client.pull(1).await.unwrap();
//!
//! assert_eq!(jobs[0].subject, "email.send");
//! assert_eq!(transport.requests().len(), 2);
//! # });
//! ```
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::transport::{Request, Response, Transport, TransportError};

/// A [`Transport`] replaying a script of outcomes and recording every request it receives.
///
/// Once the script is exhausted every request is answered with an empty `200 OK`.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<Result<Response, TransportError>>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_response(&self, response: Response) {
        lock(&self.outcomes).push_back(Ok(response));
    }

    /// Queue a response with the given status and an empty body.
    pub fn expect_status(&self, status: StatusCode) {
        self.expect_response(Response::new(status, Vec::new()));
    }

    pub fn expect_json(&self, status: StatusCode, body: Value) {
        self.expect_response(Response::new(status, body.to_string()));
    }

    pub fn expect_error(&self, error: TransportError) {
        lock(&self.outcomes).push_back(Err(error));
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.outcomes).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        lock(&self.requests).push(request.clone());
        lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| Ok(Response::new(StatusCode::OK, Vec::new())))
    }
}
