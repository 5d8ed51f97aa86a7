use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION},
    Method, StatusCode, Url,
};
use serde_json::Value;
use tracing::instrument;

use crate::{
    codec::{self, CodecError},
    executor::RequestExecutor,
    job::{Job, JobId},
    retry::{RetryConfig, RetryPolicy},
    schedule::{Schedule, ScheduleId},
    transport::{HttpTransport, Request, Response, Transport},
    ErgonError, Result,
};

/// Number of jobs to claim in one pull.
pub const BATCH_SIZE_HEADER: &str = "ergon-batch-size";
/// Seconds the service may hold a long poll open.
pub const WAIT_HEADER: &str = "ergon-wait";

const HEALTH_PATH: [&str; 3] = ["ergon", "system", "healthz"];

/// Timeouts and retry settings of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientConfig {
    pub retry: RetryConfig,
    /// Upper bound for a single attempt of a request.
    pub timeout: Duration,
    /// Added on top of `timeout` and the requested wait for [`Client::pull_wait`].
    pub long_poll_margin: Duration,
    /// Timeout of the single [`Client::ping`] attempt.
    pub health_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(3),
            long_poll_margin: Duration::from_secs(1),
            health_timeout: Duration::from_secs(1),
        }
    }
}

/// Builds a [`Client`].
///
/// Nothing is sent over the network while building; an invalid base URL or token is reported as
/// [`ErgonError::InvalidConfiguration`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    base_url: String,
    queue_id: String,
    token: String,
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new(
        base_url: impl Into<String>,
        queue_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            queue_id: queue_id.into(),
            token: token.into(),
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    pub fn with_retry(self, retry: RetryConfig) -> Self {
        Self {
            config: ClientConfig {
                retry,
                ..self.config
            },
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            config: ClientConfig {
                timeout,
                ..self.config
            },
            ..self
        }
    }

    pub fn with_long_poll_margin(self, long_poll_margin: Duration) -> Self {
        Self {
            config: ClientConfig {
                long_poll_margin,
                ..self.config
            },
            ..self
        }
    }

    pub fn with_health_timeout(self, health_timeout: Duration) -> Self {
        Self {
            config: ClientConfig {
                health_timeout,
                ..self.config
            },
            ..self
        }
    }

    /// Builds a client sending requests through a pooled `reqwest` client.
    pub fn build(self) -> Result<Client<HttpTransport>> {
        let base_url = parse_base_url(&self.base_url)?;
        let transport = HttpTransport::new().map_err(|err| {
            ErgonError::InvalidConfiguration(format!("Failed to set up HTTP client: {err}"))
        })?;
        self.build_parsed(base_url, transport)
    }

    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<Client<T>> {
        let base_url = parse_base_url(&self.base_url)?;
        self.build_parsed(base_url, transport)
    }

    fn build_parsed<T: Transport>(self, base_url: Url, transport: T) -> Result<Client<T>> {
        if self.queue_id.is_empty() {
            return Err(ErgonError::InvalidConfiguration(
                "Queue id must not be empty".to_owned(),
            ));
        }
        let queue_url = endpoint(&base_url, &["queues", self.queue_id.as_str()])?;
        let health_url = endpoint(&base_url, &HEALTH_PATH)?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| {
                ErgonError::InvalidConfiguration(
                    "Token contains characters not allowed in a header".to_owned(),
                )
            })?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Client {
            executor: RequestExecutor::new(transport, RetryPolicy::new(self.config.retry)),
            queue_url,
            health_url,
            queue_id: self.queue_id,
            headers,
            config: self.config,
        })
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url).map_err(|err| {
        ErgonError::InvalidConfiguration(format!("Invalid base URL {base_url:?}: {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(ErgonError::InvalidConfiguration(format!(
            "Base URL {base_url:?} must be an absolute http or https URL"
        )));
    }
    Ok(url)
}

/// Appends `segments` to `base`, percent encoding each of them.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ErgonError::InvalidConfiguration(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Client for a single queue of an Ergon service.
///
/// The client holds no state besides its configuration and can be shared freely between tasks,
/// e.g. behind an [`std::sync::Arc`]. Every operation is a single request, retried on connection
/// failures, server errors and rate limiting according to [`RetryConfig`].
///
/// Retrying a submission (`push`, `push_job`, `schedule`) whose response was lost can submit it
/// twice; deduplication is left to the caller or the service.
///
/// # Example
///
/// ```no_run
/// # use ergon::prelude::*;
/// # use chrono::Utc;
/// # use serde_json::json;
/// # async fn run() -> ergon::Result<()> {
/// let client = Client::new("https://ergon.example.com", "emails", "secret-token")?;
///
/// client
///     .simple_push(Some("customer-42"), "email.send", Utc::now(), json!({"to": "a@b.c"}))
///     .await?;
///
/// for job in client.pull(10).await? {
///     // process the job...
///     client.ack(&job).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client<T = HttpTransport> {
    executor: RequestExecutor<T>,
    queue_url: Url,
    health_url: Url,
    queue_id: String,
    headers: HeaderMap,
    config: ClientConfig,
}

impl Client<HttpTransport> {
    /// Creates a client with the default [`ClientConfig`].
    pub fn new(
        base_url: impl Into<String>,
        queue_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        ClientBuilder::new(base_url, queue_id, token).build()
    }

    pub fn builder(
        base_url: impl Into<String>,
        queue_id: impl Into<String>,
        token: impl Into<String>,
    ) -> ClientBuilder {
        ClientBuilder::new(base_url, queue_id, token)
    }
}

impl<T> Client<T>
where
    T: Transport,
{
    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Claims up to `count` ready jobs without waiting. No jobs available is an empty list.
    #[instrument(skip(self), fields(queue = %self.queue_id))]
    pub async fn pull(&self, count: u32) -> Result<Vec<Job>> {
        let request = self
            .request(Method::GET, &["jobs", "next"])?
            .with_header(HeaderName::from_static(BATCH_SIZE_HEADER), count.into());
        self.pull_jobs(request).await
    }

    /// Claims up to `count` jobs, letting the service hold the request open for up to `wait`
    /// until jobs become available.
    ///
    /// The per attempt timeout is extended by `wait` plus [`ClientConfig::long_poll_margin`],
    /// saturating at [`Duration::MAX`]. The wait is sent in whole seconds.
    #[instrument(skip(self), fields(queue = %self.queue_id))]
    pub async fn pull_wait(&self, wait: Duration, count: u32) -> Result<Vec<Job>> {
        let timeout = self
            .config
            .timeout
            .saturating_add(wait)
            .saturating_add(self.config.long_poll_margin);
        let request = self
            .request(Method::GET, &["jobs", "wait"])?
            .with_header(HeaderName::from_static(WAIT_HEADER), wait.as_secs().into())
            .with_header(HeaderName::from_static(BATCH_SIZE_HEADER), count.into());
        self.pull_jobs(Request { timeout, ..request }).await
    }

    async fn pull_jobs(&self, request: Request) -> Result<Vec<Job>> {
        let response = self.send(&request).await?;
        if response.status == StatusCode::NO_CONTENT {
            tracing::debug!("No jobs available");
            return Ok(Vec::new());
        }
        let jobs: Vec<Job> = codec::decode_many(response.json()?)?;
        tracing::debug!(count = jobs.len(), "Pulled jobs");
        Ok(jobs)
    }

    /// Submits `jobs` in a single batch.
    #[instrument(skip_all, fields(queue = %self.queue_id, count = jobs.len()))]
    pub async fn push(&self, jobs: &[Job]) -> Result<()> {
        let body = jobs.iter().map(encode_body).collect::<Result<_>>()?;
        let request = self
            .request(Method::POST, &["jobs", "batch"])?
            .with_body(Value::Array(body));
        self.send(&request).await?;
        tracing::debug!("Pushed jobs");
        Ok(())
    }

    /// Submits a single job, returning it as created by the service.
    #[instrument(skip_all, fields(queue = %self.queue_id, subject = %job.subject))]
    pub async fn push_job(&self, job: &Job) -> Result<Job> {
        let request = self
            .request(Method::POST, &["jobs"])?
            .with_body(encode_body(job)?);
        let response = self.send(&request).await?;
        let job: Job = decode_created(&response)?;
        tracing::debug!(job_id = ?job.id, "Pushed job");
        Ok(job)
    }

    /// Submits a job for `subject` on this client's queue with the default retry settings.
    pub async fn simple_push(
        &self,
        ordering_key: Option<&str>,
        subject: &str,
        run_at: DateTime<Utc>,
        payload: Value,
    ) -> Result<Job> {
        let mut builder = Job::builder(self.queue_id.as_str(), subject)
            .run_at(run_at)
            .with_payload(payload);
        if let Some(ordering_key) = ordering_key {
            builder = builder.with_ordering_key(ordering_key);
        }
        self.push_job(&builder.build()).await
    }

    /// Confirms `job` was processed. The job's lease must still be valid.
    pub async fn ack(&self, job: &Job) -> Result<()> {
        self.settle(job, "ack").await
    }

    /// Releases the lease on `job` for immediate redelivery.
    pub async fn nack(&self, job: &Job) -> Result<()> {
        self.settle(job, "nack").await
    }

    /// Releases the lease on `job`, asking the service not to redeliver it before `when`.
    ///
    /// `job` itself is left untouched, the request carries a copy with `retry_time` set.
    pub async fn nack_with_delay(&self, job: &Job, when: DateTime<Utc>) -> Result<()> {
        self.settle(&job.with_retry_time(when), "nack").await
    }

    /// Terminates `job` permanently, whatever its remaining retries.
    pub async fn term(&self, job: &Job) -> Result<()> {
        self.settle(job, "term").await
    }

    #[instrument(skip_all, fields(queue = %self.queue_id, job_id, action))]
    async fn settle(&self, job: &Job, action: &'static str) -> Result<()> {
        let job_id = job
            .id
            .as_ref()
            .ok_or(ErgonError::MissingId { operation: action })?;
        let span = tracing::Span::current();
        span.record("job_id", tracing::field::display(job_id));
        span.record("action", action);

        let request = self
            .request(Method::PUT, &["jobs", job_id.as_str(), action])?
            .with_body(encode_body(job)?);
        self.send(&request).await?;
        tracing::debug!(%job_id, "Job {action} sent");
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue_id, %job_id))]
    pub async fn delete_job(&self, job_id: &JobId) -> Result<()> {
        let request = self.request(Method::DELETE, &["jobs", job_id.as_str()])?;
        self.send(&request).await?;
        Ok(())
    }

    /// Deletes every job sharing `ordering_key`.
    #[instrument(skip(self), fields(queue = %self.queue_id))]
    pub async fn delete_jobs_with_key(&self, ordering_key: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &["jobs", "keys", ordering_key])?;
        self.send(&request).await?;
        Ok(())
    }

    /// Creates `schedule`, returning it as created by the service.
    #[instrument(skip_all, fields(queue = %self.queue_id, subject = %schedule.subject))]
    pub async fn schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let request = self
            .request(Method::POST, &["schedules"])?
            .with_body(encode_body(schedule)?);
        let response = self.send(&request).await?;
        let schedule: Schedule = decode_created(&response)?;
        tracing::debug!(schedule_id = ?schedule.id, "Created schedule");
        Ok(schedule)
    }

    /// Creates a schedule enqueueing a job for `subject` every `every` minutes, without limit.
    pub async fn simple_schedule(
        &self,
        ordering_key: Option<&str>,
        subject: &str,
        every: u32,
        payload: Value,
    ) -> Result<Schedule> {
        let mut builder =
            Schedule::builder(self.queue_id.as_str(), subject, every).with_payload(payload);
        if let Some(ordering_key) = ordering_key {
            builder = builder.with_ordering_key(ordering_key);
        }
        self.schedule(&builder.build()).await
    }

    /// Enqueues one job from the schedule right away, outside of its recurrence.
    #[instrument(skip(self), fields(queue = %self.queue_id, %schedule_id))]
    pub async fn trigger_schedule(&self, schedule_id: &ScheduleId) -> Result<()> {
        let request = self.request(Method::POST, &["schedules", schedule_id.as_str(), "trigger"])?;
        self.send(&request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.queue_id, %schedule_id))]
    pub async fn delete_schedule(&self, schedule_id: &ScheduleId) -> Result<()> {
        let request = self.request(Method::DELETE, &["schedules", schedule_id.as_str()])?;
        self.send(&request).await?;
        Ok(())
    }

    /// Whether the service answers its health check with `200 OK`.
    ///
    /// A single attempt is made with [`ClientConfig::health_timeout`]; transport failures count
    /// as not alive rather than being returned.
    pub async fn ping(&self) -> bool {
        let request = Request::new(
            Method::GET,
            self.health_url.clone(),
            self.config.health_timeout,
        );
        match self.executor.execute_once(&request).await {
            Ok(response) => response.status == StatusCode::OK,
            Err(err) => {
                tracing::debug!(%err, "Health check failed");
                false
            }
        }
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<Request> {
        Ok(
            Request::new(method, endpoint(&self.queue_url, segments)?, self.config.timeout)
                .with_headers(self.headers.clone()),
        )
    }

    async fn send(&self, request: &Request) -> Result<Response> {
        let response = self.executor.execute(request).await?;
        check_status(response)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text();
    tracing::warn!(%status, body = %body, "Request rejected");
    Err(if status == StatusCode::TOO_MANY_REQUESTS {
        ErgonError::RateLimited { status, body }
    } else if status.is_server_error() {
        ErgonError::ServerError { status, body }
    } else {
        ErgonError::ClientError { status, body }
    })
}

fn encode_body<R: codec::Record>(record: &R) -> Result<Value> {
    codec::encode(record)
        .map(Value::Object)
        .map_err(ErgonError::InvalidRecord)
}

fn decode_created<R: codec::Record>(response: &Response) -> Result<R> {
    codec::decode_one(response.json()?)?
        .ok_or(ErgonError::MalformedResponse(CodecError::NotAnObject { found: "null" }))
}
