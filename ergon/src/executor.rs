use reqwest::StatusCode;
use tracing::Instrument;

use crate::{
    retry::RetryPolicy,
    transport::{Request, Response, Transport, TransportError},
};

/// Runs a [`Request`] through a [`Transport`], retrying according to a [`RetryPolicy`].
///
/// Attempts are strictly sequential. Once the outcome is final, or the retry budget is spent, the
/// last response or transport error is handed back untouched so that callers can see the real
/// status.
#[derive(Debug, Clone)]
pub struct RequestExecutor<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T> RequestExecutor<T>
where
    T: Transport,
{
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let span = tracing::debug_span!(
            "request",
            method = %request.method,
            path = request.url.path()
        );
        async move {
            let mut attempt = 0;
            loop {
                let result = self.transport.send(request).await;
                let (status, error) = match &result {
                    Ok(response) => (Some(response.status), None),
                    Err(error) => (None, Some(error)),
                };

                if !self.policy.should_retry(attempt, status, error) {
                    if attempt > 0 && is_retryable_failure(status, error) {
                        tracing::error!(
                            attempts = attempt + 1,
                            ?status,
                            ?error,
                            "Giving up after {} attempts",
                            attempt + 1
                        );
                    }
                    return result;
                }

                let delay = self.policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    ?status,
                    ?error,
                    "Request failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
        .instrument(span)
        .await
    }

    /// Sends `request` exactly once, bypassing the retry policy.
    pub async fn execute_once(&self, request: &Request) -> Result<Response, TransportError> {
        self.transport.send(request).await
    }
}

fn is_retryable_failure(status: Option<StatusCode>, error: Option<&TransportError>) -> bool {
    error.is_some_and(TransportError::is_connection_failure)
        || status.is_some_and(|status| {
            status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
        })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use reqwest::Method;

    use super::*;
    use crate::{retry::RetryConfig, testing::MockTransport};

    fn executor(max_retries: u32) -> (MockTransport, RequestExecutor<MockTransport>) {
        let transport = MockTransport::new();
        let config = RetryConfig::default()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::ZERO)
            .with_jitter(Duration::ZERO);
        (
            transport.clone(),
            RequestExecutor::new(transport, config.into()),
        )
    }

    fn request() -> Request {
        Request::new(
            Method::POST,
            "http://localhost/queues/q/jobs/batch".parse().unwrap(),
            Duration::from_secs(3),
        )
        .with_body(serde_json::json!([{"subject": "a"}]))
    }

    #[tokio::test]
    async fn returns_first_success() {
        let (transport, executor) = executor(3);
        transport.expect_status(StatusCode::CREATED);

        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (transport, executor) = executor(3);
        for _ in 0..3 {
            transport.expect_status(StatusCode::SERVICE_UNAVAILABLE);
        }
        transport.expect_status(StatusCode::CREATED);

        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|sent| sent.body == request().body));
    }

    #[tokio::test]
    async fn returns_last_response_when_budget_exhausted() {
        let (transport, executor) = executor(2);
        for _ in 0..3 {
            transport.expect_status(StatusCode::SERVICE_UNAVAILABLE);
        }
        transport.expect_status(StatusCode::CREATED);

        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.remaining(), 1);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let (transport, executor) = executor(3);
        transport.expect_status(StatusCode::NOT_FOUND);
        transport.expect_status(StatusCode::OK);

        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn retries_transport_errors_and_returns_the_last_one() {
        let (transport, executor) = executor(1);
        transport.expect_error(TransportError::Connect("refused".into()));
        transport.expect_error(TransportError::Timeout("elapsed".into()));

        let result = executor.execute(&request()).await;

        assert_matches!(result, Err(TransportError::Timeout(_)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn rate_limiting_then_success() {
        let (transport, executor) = executor(3);
        transport.expect_status(StatusCode::TOO_MANY_REQUESTS);
        transport.expect_status(StatusCode::OK);

        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn execute_once_ignores_policy() {
        let (transport, executor) = executor(3);
        transport.expect_status(StatusCode::SERVICE_UNAVAILABLE);

        let response = executor.execute_once(&request()).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.requests().len(), 1);
    }
}
