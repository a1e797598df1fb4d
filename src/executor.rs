//! The query-executor seam and the per-attempt execution wrapper.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::limits::EndpointLimiter;
use crate::endpoint::Endpoint;
use crate::error::{ErrorCode, ExecError};
use crate::metrics;
use crate::record::RecordType;
use crate::response::DnsResponse;

/// Timeout applied to an attempt when neither the endpoint nor the options
/// provide one.
pub(crate) const FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends one query to one endpoint.
///
/// Implemented by the DNS transport layer; the dispatcher only decides
/// *which* endpoints to ask and *when*. Implementations report transport
/// faults by returning an [`ExecError`] rather than encoding every failure
/// as a response status. Cancellation of the passed token is best-effort:
/// implementations must be safe to abandon without resource leakage, and
/// may ignore the token entirely.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Resolves `name`/`record_type` against `endpoint`.
    async fn query(
        &self,
        endpoint: &Endpoint,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> Result<DnsResponse, ExecError>;
}

/// Runs single attempts: derives the attempt timeout, bounds the attempt
/// with the caller's token, measures latency, normalizes executor errors
/// into failure responses, and records metrics.
pub(crate) struct AttemptRunner<'a> {
    pub(crate) executor: &'a dyn QueryExecutor,
    pub(crate) limiter: &'a EndpointLimiter,
    pub(crate) default_timeout: Duration,
    pub(crate) respect_endpoint_timeout: bool,
}

impl AttemptRunner<'_> {
    /// The deadline for one attempt against `endpoint`: the endpoint's own
    /// timeout when configured to respect it, otherwise the options default.
    fn attempt_timeout(&self, endpoint: &Endpoint) -> Duration {
        if self.respect_endpoint_timeout {
            endpoint.query_timeout().unwrap_or(self.default_timeout)
        } else {
            self.default_timeout
        }
    }

    /// Executes one attempt and always produces a response.
    ///
    /// The measured round-trip time starts before per-endpoint limiter
    /// admission: queueing on a busy endpoint is part of the latency the
    /// caller observes.
    pub(crate) async fn run(
        &self,
        endpoint: &Endpoint,
        name: &str,
        record_type: RecordType,
        parent: &CancellationToken,
    ) -> DnsResponse {
        if parent.is_cancelled() {
            return DnsResponse::cancelled();
        }

        let key = endpoint.key();
        let deadline = self.attempt_timeout(endpoint);
        let started = Instant::now();
        let _permit = self.limiter.acquire(&key).await;

        let attempt_token = parent.child_token();
        let query = self.executor.query(endpoint, name, record_type, &attempt_token);
        let outcome = tokio::select! {
            res = tokio::time::timeout(deadline, query) => Some(res),
            () = parent.cancelled() => None,
        };
        let rtt = started.elapsed();

        let Some(outcome) = outcome else {
            // Caller cancellation: signal the executor and move on without
            // awaiting its teardown.
            attempt_token.cancel();
            return DnsResponse::cancelled();
        };

        let response = match outcome {
            Ok(Ok(response)) => {
                tracing::trace!(endpoint = %endpoint, ?rtt, "attempt completed");
                response.stamp(endpoint, rtt)
            }
            Ok(Err(error)) => {
                if parent.is_cancelled() {
                    return DnsResponse::cancelled();
                }
                let code = ErrorCode::classify(&error);
                tracing::debug!(endpoint = %endpoint, %error, %code, "attempt failed");
                DnsResponse::failed(code, error).stamp(endpoint, rtt)
            }
            Err(_elapsed) => {
                attempt_token.cancel();
                if parent.is_cancelled() {
                    return DnsResponse::cancelled();
                }
                tracing::debug!(endpoint = %endpoint, ?deadline, "attempt timed out");
                DnsResponse::failed(
                    ErrorCode::Timeout,
                    format!("no response from {endpoint} within {deadline:?}"),
                )
                .stamp(endpoint, rtt)
            }
        };

        if response.is_success() {
            metrics::record_success(&key, rtt);
        } else {
            metrics::record_failure(&key, rtt);
        }
        response
    }
}
