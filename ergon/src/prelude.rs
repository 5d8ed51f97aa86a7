//! The purpose of this module is to alleviate the need to import many of the `[ergon]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use ergon::prelude::*;
//! ```
pub use crate::backoff::BackoffStrategy;
pub use crate::client::{Client, ClientBuilder, ClientConfig};
pub use crate::job::{Job, JobBuilder, JobId};
pub use crate::retry::{RetryConfig, RetryPolicy};
pub use crate::schedule::{Schedule, ScheduleBuilder, ScheduleId};
pub use crate::ErgonError;
