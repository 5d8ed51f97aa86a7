use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::Job;

/// Builds a [`Job`] ready for submission.
///
/// Server maintained fields (`id`, `status`, lifecycle timestamps, `retry`, `ack_key`) are always
/// left unset.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    queue_id: String,
    subject: String,
    ordering_key: Option<String>,
    run_at: DateTime<Utc>,
    max_retries: u32,
    payload: Value,
    ack_delay: u32,
    expires_at: Option<DateTime<Utc>>,
}

impl JobBuilder {
    pub fn new(queue_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            queue_id: queue_id.into(),
            subject: subject.into(),
            ordering_key: None,
            run_at: Utc::now(),
            max_retries: Job::DEFAULT_MAX_RETRIES,
            payload: Value::Object(Default::default()),
            ack_delay: Job::DEFAULT_ACK_DELAY,
            expires_at: None,
        }
    }

    pub fn with_ordering_key(self, ordering_key: impl Into<String>) -> Self {
        Self {
            ordering_key: Some(ordering_key.into()),
            ..self
        }
    }

    pub fn with_payload(self, payload: Value) -> Self {
        Self { payload, ..self }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Seconds a consumer has to acknowledge the job once pulled.
    pub fn with_ack_delay(self, ack_delay: u32) -> Self {
        Self { ack_delay, ..self }
    }

    pub fn run_at(self, run_at: DateTime<Utc>) -> Self {
        Self { run_at, ..self }
    }

    pub fn run_in(self, run_in: TimeDelta) -> Self {
        Self {
            run_at: Utc::now() + run_in,
            ..self
        }
    }

    pub fn expires_at(self, expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: Some(expires_at),
            ..self
        }
    }

    pub fn build(self) -> Job {
        Job {
            queue_id: self.queue_id,
            ordering_key: self.ordering_key,
            subject: self.subject,
            run_at: self.run_at,
            max_retries: self.max_retries,
            payload: self.payload,
            ack_delay: self.ack_delay,
            expires_at: self.expires_at,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn build() {
        let before = Utc::now();
        let job = Job::builder("reports", "report.generate")
            .with_ordering_key("tenant-7")
            .with_payload(json!({"id": 42}))
            .with_max_retries(3)
            .with_ack_delay(30)
            .run_in(TimeDelta::hours(2))
            .build();

        assert_eq!(job.id, None);
        assert_eq!(job.status, None);
        assert_eq!(job.queue_id, "reports");
        assert_eq!(job.subject, "report.generate");
        assert_eq!(job.ordering_key.as_deref(), Some("tenant-7"));
        assert_eq!(job.payload, json!({"id": 42}));
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.ack_delay, 30);
        assert_eq!(job.retry, 0);
        assert!(job.run_at >= before + TimeDelta::hours(2));
        assert_eq!(job.enqueued_at, None);
        assert_eq!(job.ack_key, None);
    }

    #[test]
    fn defaults() {
        let job = JobBuilder::new("reports", "report.generate").build();

        assert_eq!(job.max_retries, Job::DEFAULT_MAX_RETRIES);
        assert_eq!(job.ack_delay, Job::DEFAULT_ACK_DELAY);
        assert_eq!(job.payload, json!({}));
        assert_eq!(job.ordering_key, None);
        assert_eq!(job.expires_at, None);
    }
}
