//! Time-boxed cache of facilitator fee payers.
//!
//! Fee payers rarely change, so the `/supported` lookup is cached per
//! network. Expired entries are never returned; a background sweep started
//! with [`FeePayerCache::spawn_cleanup`] removes them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Entry {
    fee_payer: String,
    stored_at: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= ttl
    }
}

/// Fee-payer addresses keyed by network id.
#[derive(Debug)]
pub struct FeePayerCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl FeePayerCache {
    /// Default entry lifetime (5 minutes).
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached fee payer unless it is missing or expired.
    pub async fn get(&self, network: &str) -> Option<String> {
        let guard = self.entries.read().await;
        let entry = guard.get(network)?;
        if entry.is_expired(self.ttl, Instant::now()) {
            None
        } else {
            Some(entry.fee_payer.clone())
        }
    }

    /// Stores `fee_payer` for `network`, replacing any previous entry.
    pub async fn set(&self, network: impl Into<String>, fee_payer: impl Into<String>) {
        let mut guard = self.entries.write().await;
        guard.insert(
            network.into(),
            Entry {
                fee_payer: fee_payer.into(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - guard.len()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Starts a task calling [`Self::cleanup_expired`] every `interval` until
    /// `token` is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.cleanup_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "Expired fee payers removed");
                        }
                    }
                }
            }
            tracing::debug!("Fee payer cache sweep stopped");
        })
    }
}

impl Default for FeePayerCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
