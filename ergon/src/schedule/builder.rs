use serde_json::Value;

use super::Schedule;
use crate::job::Job;

/// Builds a [`Schedule`] ready for submission.
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    queue_id: String,
    subject: String,
    every: u32,
    ordering_key: Option<String>,
    max_enqueues: u32,
    max_retries: u32,
    payload: Value,
    ack_delay: u32,
}

impl ScheduleBuilder {
    /// A schedule enqueueing a job for `subject` every `every` minutes.
    pub fn new(queue_id: impl Into<String>, subject: impl Into<String>, every: u32) -> Self {
        Self {
            queue_id: queue_id.into(),
            subject: subject.into(),
            every,
            ordering_key: None,
            max_enqueues: 0,
            max_retries: Job::DEFAULT_MAX_RETRIES,
            payload: Value::Object(Default::default()),
            ack_delay: Job::DEFAULT_ACK_DELAY,
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

    /// Stop after enqueueing `max_enqueues` jobs, `0` meaning never stop.
    pub fn with_max_enqueues(self, max_enqueues: u32) -> Self {
        Self {
            max_enqueues,
            ..self
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_ack_delay(self, ack_delay: u32) -> Self {
        Self { ack_delay, ..self }
    }

    pub fn build(self) -> Schedule {
        Schedule {
            queue_id: self.queue_id,
            ordering_key: self.ordering_key,
            subject: self.subject,
            every: self.every,
            max_enqueues: self.max_enqueues,
            max_retries: self.max_retries,
            payload: self.payload,
            ack_delay: self.ack_delay,
            ..Default::default()
        }
    }
}
