//! Endpoint selection strategies.
//!
//! One dispatch picks its handler from the [`Strategy`] enum once per call;
//! each handler is a plain async function over the shared attempt runner,
//! which keeps the four algorithms independently testable without a trait
//! hierarchy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use super::cache;
use crate::endpoint::{fingerprint, Endpoint};
use crate::error::ErrorCode;
use crate::executor::AttemptRunner;
use crate::record::RecordType;
use crate::response::DnsResponse;

/// The algorithm deciding which endpoint(s) to contact and how to pick the
/// winning response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Race endpoints in windows of the configured parallelism and return
    /// the first successful response, cancelling the rest of the window.
    #[default]
    FirstSuccess,
    /// Race the whole set, remember the empirically fastest endpoint, and
    /// prefer it on later queries until the cache entry expires.
    FastestWins,
    /// Try endpoints one at a time, in list order, until one succeeds.
    SequentialAll,
    /// Rotate the primary endpoint across calls, with a single fallback
    /// attempt on failure.
    RoundRobin,
}

/// Counter backing [`Strategy::RoundRobin`]'s rotation. Process-wide so the
/// rotation spreads across dispatcher instances too.
static ROUND_ROBIN: AtomicUsize = AtomicUsize::new(0);

/// Everything one dispatch needs: the attempt runner plus the selection
/// inputs from the resolver options.
pub(crate) struct Dispatch<'a> {
    pub(crate) runner: AttemptRunner<'a>,
    pub(crate) endpoints: &'a [Endpoint],
    pub(crate) max_parallelism: usize,
    pub(crate) use_fastest_cache: bool,
    pub(crate) fastest_cache_duration: Duration,
}

/// The surfacing rank of a failed response.
fn rank_of(response: &DnsResponse) -> u8 {
    response.error_code.unwrap_or(ErrorCode::ServFail).rank()
}

/// Keeps the better-ranked of the current best failure and a new one. Ties
/// keep the first-seen failure.
fn prefer(best: Option<DnsResponse>, candidate: DnsResponse) -> Option<DnsResponse> {
    match best {
        None => Some(candidate),
        Some(current) if rank_of(&candidate) < rank_of(&current) => Some(candidate),
        current => current,
    }
}

impl Dispatch<'_> {
    fn window_size(&self) -> usize {
        self.max_parallelism.max(1)
    }

    /// Runs one logical query under `strategy`.
    pub(crate) async fn run(
        &self,
        strategy: Strategy,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        match strategy {
            Strategy::FirstSuccess => self.first_success(name, record_type, token).await,
            Strategy::FastestWins => self.fastest_wins(name, record_type, token).await,
            Strategy::SequentialAll => self.sequential_all(name, record_type, token).await,
            Strategy::RoundRobin => self.round_robin(name, record_type, token).await,
        }
    }

    /// Races windows of endpoints; the first success in a window cancels
    /// its siblings and wins. Later windows only run when earlier ones
    /// produced no success.
    async fn first_success(
        &self,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        let mut best = None;
        for window in self.endpoints.chunks(self.window_size()) {
            if token.is_cancelled() {
                return DnsResponse::cancelled();
            }
            let scope = token.child_token();
            let mut attempts: FuturesUnordered<_> = window
                .iter()
                .map(|endpoint| self.runner.run(endpoint, name, record_type, &scope))
                .collect();
            // Arrival order, not submission order.
            while let Some(response) = attempts.next().await {
                if response.is_success() {
                    scope.cancel();
                    return response;
                }
                if !response.is_cancellation() {
                    best = prefer(best, response);
                }
            }
        }
        if token.is_cancelled() {
            return DnsResponse::cancelled();
        }
        best.unwrap_or_else(|| DnsResponse::servfail("all endpoints failed"))
    }

    /// Awaits each endpoint fully, in list order, stopping at the first
    /// success.
    async fn sequential_all(
        &self,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        let mut best = None;
        for endpoint in self.endpoints {
            if token.is_cancelled() {
                return DnsResponse::cancelled();
            }
            let response = self.runner.run(endpoint, name, record_type, token).await;
            if response.is_success() || response.is_cancellation() {
                return response;
            }
            best = prefer(best, response);
        }
        best.unwrap_or_else(|| DnsResponse::servfail("all endpoints failed"))
    }

    /// Rotates the primary endpoint across calls. On primary failure a
    /// single fallback attempt runs against endpoint 0, or endpoint 1 when
    /// the primary *was* endpoint 0. Deliberately non-exhaustive: this
    /// strategy trades retry depth for distribution.
    async fn round_robin(
        &self,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        let count = self.endpoints.len();
        let index = ROUND_ROBIN.fetch_add(1, Ordering::Relaxed) % count;
        let primary = &self.endpoints[index];

        let first = self.runner.run(primary, name, record_type, token).await;
        if first.is_success() || first.is_cancellation() {
            return first;
        }

        let fallback_index = if index == 0 { 1 } else { 0 };
        if fallback_index >= count {
            return first;
        }
        tracing::debug!(
            primary = %primary,
            fallback = %self.endpoints[fallback_index],
            "round-robin primary failed, trying fallback"
        );
        let second = self
            .runner
            .run(&self.endpoints[fallback_index], name, record_type, token)
            .await;
        if second.is_success() || second.is_cancellation() {
            return second;
        }
        // The rank-worse failure of the two is surfaced; ties keep the
        // primary's.
        if rank_of(&second) > rank_of(&first) {
            second
        } else {
            first
        }
    }

    /// Prefers the cached fastest endpoint for this set; otherwise races the
    /// entire set and remembers the lowest-latency winner.
    async fn fastest_wins(
        &self,
        name: &str,
        record_type: RecordType,
        token: &CancellationToken,
    ) -> DnsResponse {
        let set_id = fingerprint(self.endpoints);

        if self.use_fastest_cache {
            if let Some(winner) = cache::get(&set_id) {
                if let Some(endpoint) =
                    self.endpoints.iter().find(|e| e.key() == winner)
                {
                    tracing::trace!(%winner, "fastest-endpoint cache hit");
                    let response =
                        self.runner.run(endpoint, name, record_type, token).await;
                    if response.is_success() || response.is_cancellation() {
                        return response;
                    }
                    // Cache-hit failure: fall through to a full re-race.
                }
            }
        }
        if token.is_cancelled() {
            return DnsResponse::cancelled();
        }

        // Admit attempts up to the parallelism cap, replenishing slots as
        // attempts conclude. Every attempt runs to conclusion; the lowest
        // measured latency among the successes wins.
        let mut pending = self.endpoints.iter();
        let mut in_flight: FuturesUnordered<_> = pending
            .by_ref()
            .take(self.window_size())
            .map(|endpoint| self.runner.run(endpoint, name, record_type, token))
            .collect();

        let mut best_success: Option<DnsResponse> = None;
        let mut best_error: Option<DnsResponse> = None;
        while let Some(response) = in_flight.next().await {
            if response.is_success() {
                let faster = best_success
                    .as_ref()
                    .map_or(true, |cur| response.round_trip_time < cur.round_trip_time);
                if faster {
                    best_success = Some(response);
                }
            } else if !response.is_cancellation() {
                best_error = prefer(best_error, response);
            }
            if let Some(endpoint) = pending.next() {
                in_flight.push(self.runner.run(endpoint, name, record_type, token));
            }
        }

        if let Some(winner) = best_success {
            if self.use_fastest_cache && self.endpoints.len() > 1 {
                if let Some(key) = winner.endpoint.clone() {
                    cache::store(set_id, key, self.fastest_cache_duration);
                }
            }
            return winner;
        }
        if token.is_cancelled() {
            return DnsResponse::cancelled();
        }
        best_error.unwrap_or_else(|| DnsResponse::servfail("all endpoints failed"))
    }
}
