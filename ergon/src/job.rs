use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::codec::{wire_record, FieldKind, WireField, WireValue};

pub mod builder;

pub use builder::JobBuilder;

/// The server assigned identifier of a [`Job`].
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl WireField for JobId {
    const KIND: FieldKind = FieldKind::Text;

    fn to_wire(&self) -> WireValue {
        WireValue::Text(self.0.clone())
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        String::from_wire(value).map(Self)
    }
}

wire_record! {
    /// A unit of work held by the Ergon service.
    ///
    /// Jobs built locally for submission (see [`Job::builder`]) leave every server maintained
    /// field unset. Jobs returned by the service are only ever replaced by decoding a fresh
    /// response, never patched in place.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Job {
        pub id: Option<JobId>,
        pub queue_id: String,
        /// Jobs sharing an ordering key are processed by the service in submission order.
        pub ordering_key: Option<String>,
        pub subject: String,
        pub status: Option<String>,
        pub enqueued_at: Option<DateTime<Utc>>,
        /// The earliest time the job may be handed to a consumer.
        pub run_at: DateTime<Utc>,
        pub pulled_at: Option<DateTime<Utc>>,
        pub last_retry_at: Option<DateTime<Utc>>,
        pub acked_at: Option<DateTime<Utc>>,
        pub termed_at: Option<DateTime<Utc>>,
        pub failed_at: Option<DateTime<Utc>>,
        pub retry: u32,
        pub max_retries: u32,
        pub payload: Value,
        /// Failure detail reported by the service, `null` when there is none.
        pub error: Value,
        /// Lease token granted on pull, required to ack, nack or term the job.
        pub ack_key: Option<String>,
        /// When set on a nack the job is not redelivered before this time.
        pub retry_time: Option<DateTime<Utc>>,
        /// Seconds the consumer has to acknowledge the job before the lease expires.
        pub ack_delay: u32,
        pub expires_at: Option<DateTime<Utc>>,
    }
}

impl Job {
    pub const DEFAULT_MAX_RETRIES: u32 = 50;
    pub const DEFAULT_ACK_DELAY: u32 = 120;

    pub fn builder(queue_id: impl Into<String>, subject: impl Into<String>) -> JobBuilder {
        JobBuilder::new(queue_id, subject)
    }

    /// Returns a copy of this job asking the service not to redeliver it before `when`.
    pub fn with_retry_time(&self, when: DateTime<Utc>) -> Self {
        Self {
            retry_time: Some(when),
            ..self.clone()
        }
    }

    /// Whether the job currently holds a lease from a pull.
    pub fn is_leased(&self) -> bool {
        self.ack_key.is_some()
    }

    /// When the current lease runs out, if the job is leased.
    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        self.ack_key.as_ref()?;
        let pulled_at = self.pulled_at?;
        Some(pulled_at + chrono::TimeDelta::seconds(self.ack_delay.into()))
    }
}
