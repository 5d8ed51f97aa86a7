use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::codec::{wire_record, FieldKind, WireField, WireValue};

pub mod builder;

pub use builder::ScheduleBuilder;

/// The server assigned identifier of a [`Schedule`].
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ScheduleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ScheduleId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl WireField for ScheduleId {
    const KIND: FieldKind = FieldKind::Text;

    fn to_wire(&self) -> WireValue {
        WireValue::Text(self.0.clone())
    }

    fn from_wire(value: WireValue) -> Option<Self> {
        String::from_wire(value).map(Self)
    }
}

wire_record! {
    /// A recurring job template the service expands into jobs every `every` minutes.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Schedule {
        pub id: Option<ScheduleId>,
        pub queue_id: String,
        pub ordering_key: Option<String>,
        pub subject: String,
        /// Recurrence interval in minutes.
        pub every: u32,
        pub last_enqueued_at: Option<DateTime<Utc>>,
        pub next_enqueue_at: Option<DateTime<Utc>>,
        /// Maximum number of jobs to enqueue, `0` meaning unlimited.
        pub max_enqueues: u32,
        pub total_enqueues: Option<u32>,
        pub max_retries: u32,
        pub payload: Value,
        pub ack_delay: u32,
    }
}

impl Schedule {
    pub fn builder(
        queue_id: impl Into<String>,
        subject: impl Into<String>,
        every: u32,
    ) -> ScheduleBuilder {
        ScheduleBuilder::new(queue_id, subject, every)
    }

    /// Whether the schedule has used up its `max_enqueues`.
    pub fn is_exhausted(&self) -> bool {
        self.max_enqueues != 0 && self.total_enqueues.unwrap_or_default() >= self.max_enqueues
    }
}
