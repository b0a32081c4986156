use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flock_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};

use crate::context::IterationContext;
use crate::outcome::{CheckResult, OutcomeKind, RequestOutcome};
use crate::scenario::RequestStep;

/// Sends one fully rendered request. Implementations must not retry.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = flock_http::Result<HttpResponse>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = flock_http::Result<HttpResponse>> + Send {
        self.client.request(req)
    }
}

/// Runs request steps against a [`Transport`] under a deadline.
#[derive(Debug)]
pub struct Executor<T> {
    transport: Arc<T>,
    default_timeout: Duration,
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<T: Transport> Executor<T> {
    pub fn new(transport: Arc<T>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    pub fn render(step: &RequestStep, ctx: &IterationContext) -> HttpRequest {
        let mut req = HttpRequest::new(step.method.clone(), step.url.render(ctx));
        req.headers = step
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.render(ctx)))
            .collect();
        if let Some(body) = &step.body {
            req.body = Bytes::from(body.render(ctx));
        }
        req
    }

    /// Sends the step's request once. The deadline covers connect, headers and body; on expiry
    /// the call is dropped and the outcome is a `timeout` transport error. Failed requests
    /// count no bytes.
    pub async fn execute(&self, step: &RequestStep, ctx: &IterationContext) -> RequestOutcome {
        let req = Self::render(step, ctx);
        let timeout = step.timeout.unwrap_or(self.default_timeout);

        let started_at = Instant::now();
        let result = tokio::time::timeout(timeout, self.transport.send(req)).await;
        let finished_at = Instant::now();

        let (kind, bytes_sent, bytes_received) = match result {
            Ok(Ok(res)) => (
                OutcomeKind::Status(res.status),
                res.bytes_sent,
                res.bytes_received,
            ),
            Ok(Err(err)) => (OutcomeKind::Transport(err.transport_error_kind()), 0, 0),
            Err(_) => (OutcomeKind::Transport(HttpTransportErrorKind::Timeout), 0, 0),
        };

        let latency = finished_at.saturating_duration_since(started_at);
        let status = match kind {
            OutcomeKind::Status(s) => Some(s),
            OutcomeKind::Transport(_) => None,
        };
        let checks = step
            .checks
            .iter()
            .map(|c| CheckResult {
                name: c.name.clone(),
                passed: c.passes(status, latency),
            })
            .collect();

        RequestOutcome {
            step: step.name.clone(),
            kind,
            started_at,
            finished_at,
            bytes_sent,
            bytes_received,
            checks,
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use parking_lot::Mutex;

    /// Replies with a fixed status after a fixed delay, remembering every request.
    #[derive(Debug, Default)]
    pub(crate) struct StubTransport {
        pub status: u16,
        pub delay: Duration,
        pub fail_with_invalid_url: bool,
        pub seen: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub(crate) fn ok(delay: Duration) -> Self {
            Self {
                status: 200,
                delay,
                ..Self::default()
            }
        }
    }

    impl Transport for StubTransport {
        fn send(
            &self,
            req: HttpRequest,
        ) -> impl Future<Output = flock_http::Result<HttpResponse>> + Send {
            self.seen.lock().push(req.clone());
            let status = self.status;
            let delay = self.delay;
            let fail = self.fail_with_invalid_url;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    return Err(flock_http::Error::InvalidUrl(req.url));
                }
                Ok(HttpResponse {
                    status,
                    body: Bytes::new(),
                    headers: Vec::new(),
                    bytes_sent: 10,
                    bytes_received: 20,
                })
            }
        }
    }
}
