//! An async client for the Ergon job queue service.
//!
//! A [`Client`] talks to a single queue of an Ergon service over HTTP: it submits [`job::Job`]s
//! and recurring [`schedule::Schedule`]s, claims the next available jobs, and reports their
//! outcome back to the service.
//!
//! Every request goes through a [`executor::RequestExecutor`] which retries connection
//! failures, server errors and rate limiting with exponential backoff, see
//! [`retry::RetryConfig`]. Jobs and schedules are translated to and from the service's JSON
//! representation by the [`codec`] module.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ergon::prelude::*;
//!
//! # async fn run() -> ergon::Result<()> {
//! let client = Client::builder("https://ergon.example.com", "emails", "secret-token")
//!     .with_retry(RetryConfig::default().with_max_retries(5))
//!     .build()?;
//!
//! loop {
//!     for job in client.pull_wait(Duration::from_secs(10), 5).await? {
//!         match send_email(&job.payload).await {
//!             Ok(()) => client.ack(&job).await?,
//!             Err(_) => client.nack(&job).await?,
//!         }
//!     }
//! }
//! # }
//! # async fn send_email(_: &serde_json::Value) -> Result<(), ()> { Ok(()) }
//! ```
use reqwest::StatusCode;
use thiserror::Error;

pub mod backoff;
pub mod client;
pub mod codec;
pub mod executor;
pub mod job;
pub mod prelude;
pub mod retry;
pub mod schedule;
pub mod testing;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientConfig};

use codec::CodecError;
use transport::TransportError;

pub type Result<T> = std::result::Result<T, ErgonError>;

/// Errors returned by [`Client`] operations.
#[derive(Debug, Error)]
pub enum ErgonError {
    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Error communicating with the service")]
    Transport(#[from] TransportError),
    #[error("Service error {status}: {body}")]
    ServerError { status: StatusCode, body: String },
    #[error("Rate limited by the service ({status}): {body}")]
    RateLimited { status: StatusCode, body: String },
    #[error("Request rejected with {status}: {body}")]
    ClientError { status: StatusCode, body: String },
    #[error("Malformed response from the service")]
    MalformedResponse(#[from] CodecError),
    #[error("Record cannot be sent to the service")]
    InvalidRecord(#[source] CodecError),
    #[error("Cannot {operation} a job without an id")]
    MissingId { operation: &'static str },
}

impl ErgonError {
    /// The HTTP status of the rejected request, if the service answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ServerError { status, .. }
            | Self::RateLimited { status, .. }
            | Self::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
