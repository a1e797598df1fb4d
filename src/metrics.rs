//! Per-endpoint query metrics.
//!
//! Counters are process-wide and shared by every dispatcher instance, keyed
//! by endpoint identity. They are monotonic and never pruned or reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use dashmap::DashMap;

use crate::endpoint::EndpointKey;

/// Sentinel for "no round trip recorded yet".
const NO_RTT: u64 = u64::MAX;

#[derive(Debug)]
struct EndpointStats {
    success: AtomicU64,
    failure: AtomicU64,
    last_rtt_micros: AtomicU64,
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            last_rtt_micros: AtomicU64::new(NO_RTT),
        }
    }
}

/// A point-in-time snapshot of one endpoint's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMetrics {
    /// Number of attempts that produced a successful response.
    pub success_count: u64,
    /// Number of attempts that failed or produced a failure response.
    pub failure_count: u64,
    /// Round-trip time of the most recent attempt, if any completed.
    pub last_round_trip_time: Option<Duration>,
}

fn registry() -> &'static DashMap<EndpointKey, EndpointStats> {
    static REGISTRY: OnceLock<DashMap<EndpointKey, EndpointStats>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

fn record(key: &EndpointKey, rtt: Duration, success: bool) {
    let stats = registry().entry(key.clone()).or_default();
    let counter = if success {
        &stats.success
    } else {
        &stats.failure
    };
    counter.fetch_add(1, Ordering::Relaxed);
    stats
        .last_rtt_micros
        .store(rtt.as_micros() as u64, Ordering::Relaxed);
}

/// Records a successful attempt against `key`.
pub(crate) fn record_success(key: &EndpointKey, rtt: Duration) {
    record(key, rtt, true);
}

/// Records a failed attempt against `key`.
pub(crate) fn record_failure(key: &EndpointKey, rtt: Duration) {
    record(key, rtt, false);
}

/// Returns the current counters for `key`, or `None` if no attempt against
/// that endpoint has ever completed in this process.
pub fn snapshot(key: &EndpointKey) -> Option<EndpointMetrics> {
    let stats = registry().get(key)?;
    let last = stats.last_rtt_micros.load(Ordering::Relaxed);
    Some(EndpointMetrics {
        success_count: stats.success.load(Ordering::Relaxed),
        failure_count: stats.failure.load(Ordering::Relaxed),
        last_round_trip_time: (last != NO_RTT).then(|| Duration::from_micros(last)),
    })
}
