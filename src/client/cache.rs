//! Fastest-endpoint cache.
//!
//! Remembers, per endpoint *set*, which endpoint last won a genuine
//! multi-endpoint race so that subsequent FastestWins queries can go
//! straight to it until the entry expires.
//!
//! The map is process-wide and shared by every dispatcher instance. Reads
//! and the post-race write are not mutually exclusive: two callers may both
//! find the entry expired, both re-race, and both write. The last writer
//! wins, which is acceptable because each writer's endpoint was genuinely
//! fastest at its own race time.

use std::sync::OnceLock;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::endpoint::{EndpointKey, SetFingerprint};

#[derive(Debug, Clone)]
struct FastestEntry {
    winner: EndpointKey,
    expires_at: Instant,
}

fn cache() -> &'static DashMap<SetFingerprint, FastestEntry> {
    static CACHE: OnceLock<DashMap<SetFingerprint, FastestEntry>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Returns the cached winner for `fingerprint` while its entry is live.
///
/// An expired entry is removed and treated as absent, forcing a full
/// re-race.
pub(crate) fn get(fingerprint: &SetFingerprint) -> Option<EndpointKey> {
    let entry = cache().get(fingerprint)?;
    if Instant::now() < entry.expires_at {
        Some(entry.winner.clone())
    } else {
        drop(entry);
        cache().remove(fingerprint);
        None
    }
}

/// Stores the winner of a completed multi-endpoint race.
///
/// Only ever called after a real race success; a single untested endpoint
/// must never be written here.
pub(crate) fn store(fingerprint: SetFingerprint, winner: EndpointKey, ttl: Duration) {
    tracing::debug!(%winner, "caching fastest endpoint");
    cache().insert(
        fingerprint,
        FastestEntry {
            winner,
            expires_at: Instant::now() + ttl,
        },
    );
}

/// Removes every cached winner. Idempotent.
pub(crate) fn clear() {
    cache().clear();
}

/// Removes the cached winner for one endpoint set. A no-op when no entry
/// exists. Idempotent.
pub(crate) fn clear_for(fingerprint: &SetFingerprint) {
    cache().remove(fingerprint);
}
