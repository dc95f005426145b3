//! At most one live grading run per (student, challenge).
//!
//! A slot is held by an [`InFlightGuard`] and released when the guard drops.
//! Each slot also carries an expiry, so a run that never releases (a crashed
//! task, a leaked guard) cannot block the pair forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Longest a single claim may live, whatever ttl is asked for.
pub const MAX_CLAIM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InFlightKey {
    pub student_id: String,
    pub challenge_id: String,
}

impl InFlightKey {
    pub fn new(student_id: impl Into<String>, challenge_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            challenge_id: challenge_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    token: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: DashMap<InFlightKey, Marker>,
    next_token: AtomicU64,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `key` for at most `ttl`.
    ///
    /// Returns `None` while another unexpired claim exists. An expired claim is
    /// taken over. `ttl` is capped at [`MAX_CLAIM_TTL`].
    pub fn try_acquire(self: &Arc<Self>, key: InFlightKey, ttl: Duration) -> Option<InFlightGuard> {
        let ttl = ttl.min(MAX_CLAIM_TTL);
        let now = Instant::now();
        let marker = Marker {
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return None;
                }
                warn!(
                    student_id = %key.student_id,
                    challenge_id = %key.challenge_id,
                    "Taking over expired in-flight claim"
                );
                occupied.insert(marker);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(marker);
            }
        }

        debug!(
            student_id = %key.student_id,
            challenge_id = %key.challenge_id,
            ttl_ms = ttl.as_millis() as u64,
            "Acquired in-flight claim"
        );

        Some(InFlightGuard {
            registry: Arc::clone(self),
            key,
            token: marker.token,
        })
    }

    /// Whether an unexpired claim exists for `key`.
    pub fn is_in_flight(&self, key: &InFlightKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|m| m.expires_at > Instant::now())
    }

    /// Drop every expired claim. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, m| m.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Releases its claim on drop, unless the claim has since been taken over.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: InFlightKey,
    token: u64,
}

impl InFlightGuard {
    pub fn key(&self) -> &InFlightKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let token = self.token;
        self.registry
            .entries
            .remove_if(&self.key, |_, m| m.token == token);
    }
}

/// Spawn a background task that periodically purges expired claims.
pub fn spawn_purge_task(
    registry: Arc<InFlightRegistry>,
    purge_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);

        loop {
            interval.tick().await;
            let removed = registry.purge_expired();
            if removed > 0 {
                info!(removed, "Purged expired in-flight claims");
            }
        }
    })
}
