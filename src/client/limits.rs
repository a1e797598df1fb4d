//! Per-endpoint in-flight limiting.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::endpoint::EndpointKey;

/// Bounds the number of in-flight attempts per endpoint identity, across
/// every call and strategy issued through one dispatcher instance.
///
/// Semaphores are created lazily, once per endpoint key, and live for the
/// dispatcher's lifetime. They are never evicted; a process resolving
/// against an unbounded stream of distinct endpoints will grow this map
/// without bound. That is a known limitation.
#[derive(Debug, Default)]
pub(crate) struct EndpointLimiter {
    max_in_flight: Option<usize>,
    semaphores: DashMap<EndpointKey, Arc<Semaphore>>,
}

impl EndpointLimiter {
    pub(crate) fn new(max_in_flight: Option<usize>) -> Self {
        Self {
            max_in_flight,
            semaphores: DashMap::new(),
        }
    }

    /// Waits for an in-flight slot on `key`.
    ///
    /// Returns `None` without waiting when no per-endpoint limit is
    /// configured. The returned permit must be held only for the duration of
    /// one executor invocation, never across fallback attempts.
    pub(crate) async fn acquire(&self, key: &EndpointKey) -> Option<OwnedSemaphorePermit> {
        let limit = self.max_in_flight?;
        let semaphore = self
            .semaphores
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(limit.max(1))))
            .clone();
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("endpoint limiter semaphores are never closed");
        Some(permit)
    }
}
