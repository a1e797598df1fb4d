//! The multi-endpoint resolver client.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{fingerprint, Endpoint};
use crate::error::MultiResolverError;
use crate::executor::{AttemptRunner, QueryExecutor, FALLBACK_TIMEOUT};
use crate::metrics::{self, EndpointMetrics};
use crate::record::RecordType;
use crate::response::DnsResponse;

pub(crate) mod cache;
pub(crate) mod limits;

/// Endpoint selection strategies.
pub mod strategy;

use strategy::{Dispatch, Strategy};

/// Configuration for a [`MultiResolver`].
#[derive(Debug, Clone)]
pub struct MultiResolverOptions {
    /// The endpoint selection strategy.
    pub strategy: Strategy,
    /// Upper bound on simultaneous endpoint attempts per call, and on
    /// simultaneous per-name dispatches in a batch. Values below 1 behave
    /// as 1.
    pub max_parallelism: usize,
    /// Optional upper bound on in-flight attempts per endpoint identity,
    /// across all calls through one resolver.
    pub per_endpoint_max_in_flight: Option<usize>,
    /// Whether an endpoint's own timeout overrides
    /// [`default_timeout`](Self::default_timeout) for attempts against it.
    pub respect_endpoint_timeout: bool,
    /// Attempt timeout used when the endpoint does not provide its own (or
    /// when per-endpoint timeouts are not respected).
    pub default_timeout: Duration,
    /// Whether executors may serve full responses from a per-name cache.
    /// Consumed by caching executor implementations, not by the dispatcher.
    pub use_response_cache: bool,
    /// Upper bound on cached responses for executors that honor
    /// [`use_response_cache`](Self::use_response_cache).
    pub max_response_cache_entries: usize,
    /// Whether [`Strategy::FastestWins`] remembers race winners.
    pub use_fastest_cache: bool,
    /// How long a remembered race winner stays valid.
    pub fastest_cache_duration: Duration,
}

impl Default for MultiResolverOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_parallelism: 4,
            per_endpoint_max_in_flight: None,
            respect_endpoint_timeout: true,
            default_timeout: FALLBACK_TIMEOUT,
            use_response_cache: true,
            max_response_cache_entries: 10_000,
            use_fastest_cache: true,
            fastest_cache_duration: Duration::from_secs(300),
        }
    }
}

/// Client that dispatches DNS queries across a set of candidate resolver
/// endpoints.
///
/// # Usage
///
/// A resolver is created with [`MultiResolver::new`] (or
/// [`with_options`](MultiResolver::with_options)) from a non-empty endpoint
/// collection and a [`QueryExecutor`] implementation supplied by the
/// transport layer. Queries then go through [`query`](MultiResolver::query)
/// and [`query_batch`](MultiResolver::query_batch); both report failures on
/// the returned response rather than through `Err`.
pub struct MultiResolver {
    endpoints: Vec<Endpoint>,
    options: MultiResolverOptions,
    executor: Arc<dyn QueryExecutor>,
    limiter: limits::EndpointLimiter,
}

impl MultiResolver {
    /// Creates a resolver over `endpoints` with default options.
    ///
    /// Fails fast with [`MultiResolverError::NoEndpoints`] when the endpoint
    /// collection is empty; this is the only failure the constructor knows.
    pub fn new(
        endpoints: Vec<Endpoint>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self, MultiResolverError> {
        Self::with_options(endpoints, executor, MultiResolverOptions::default())
    }

    /// Creates a resolver over `endpoints` with the given options.
    pub fn with_options(
        endpoints: Vec<Endpoint>,
        executor: Arc<dyn QueryExecutor>,
        options: MultiResolverOptions,
    ) -> Result<Self, MultiResolverError> {
        if endpoints.is_empty() {
            return Err(MultiResolverError::NoEndpoints);
        }
        let limiter = limits::EndpointLimiter::new(options.per_endpoint_max_in_flight);
        Ok(Self {
            endpoints,
            options,
            executor,
            limiter,
        })
    }

    /// Sets the strategy of the resolver.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// The configured endpoints, in their configured order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// The resolver's options.
    pub fn options(&self) -> &MultiResolverOptions {
        &self.options
    }

    fn dispatch(&self) -> Dispatch<'_> {
        Dispatch {
            runner: AttemptRunner {
                executor: &*self.executor,
                limiter: &self.limiter,
                default_timeout: self.options.default_timeout,
                respect_endpoint_timeout: self.options.respect_endpoint_timeout,
            },
            endpoints: &self.endpoints,
            max_parallelism: self.options.max_parallelism,
            use_fastest_cache: self.options.use_fastest_cache,
            fastest_cache_duration: self.options.fastest_cache_duration,
        }
    }

    /// Resolves one logical query.
    ///
    /// Never returns an error: attempt failures are classified and folded
    /// into the returned response, and a pre-cancelled `token` yields the
    /// cancellation signal immediately, without contacting any endpoint.
    pub async fn query(
        &self,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        if token.is_cancelled() {
            return DnsResponse::cancelled();
        }
        tracing::trace!(name, %record_type, strategy = ?self.options.strategy, "dispatching query");
        self.dispatch()
            .run(self.options.strategy, name, record_type, token)
            .await
    }

    /// Resolves a batch of names, preserving input order.
    ///
    /// Each name's dispatch is admitted through one shared semaphore sized
    /// by [`max_parallelism`](MultiResolverOptions::max_parallelism). The
    /// result always has one response per input name, `result[i]`
    /// corresponding to `names[i]` regardless of completion order, and one
    /// name's failure never affects another's dispatch.
    pub async fn query_batch<S: AsRef<str> + Sync>(
        &self,
        names: &[S],
        record_type: RecordType,
        token: &CancellationToken,
    ) -> Vec<DnsResponse> {
        let admission = Arc::new(Semaphore::new(self.options.max_parallelism.max(1)));
        let queries = names.iter().map(|name| {
            let admission = admission.clone();
            async move {
                let _permit = admission
                    .acquire()
                    .await
                    .expect("batch admission semaphore is never closed");
                self.query(name.as_ref(), record_type, token).await
            }
        });
        futures_util::future::join_all(queries).await
    }

    /// Forgets every remembered race winner. Process-wide: the fastest
    /// cache is shared across resolver instances. Idempotent.
    pub fn clear_fastest_cache(&self) {
        cache::clear();
    }

    /// Forgets the remembered race winner for one endpoint set, identified
    /// by the same order-independent fingerprint FastestWins uses. A no-op
    /// when nothing is remembered for the set. Idempotent.
    pub fn clear_fastest_cache_for(&self, endpoints: &[Endpoint]) {
        cache::clear_for(&fingerprint(endpoints));
    }

    /// The process-wide metrics recorded so far for one of this resolver's
    /// endpoints (or any endpoint sharing its identity).
    pub fn endpoint_metrics(&self, endpoint: &Endpoint) -> Option<EndpointMetrics> {
        metrics::snapshot(&endpoint.key())
    }
}

impl std::fmt::Debug for MultiResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiResolver")
            .field("endpoints", &self.endpoints)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
