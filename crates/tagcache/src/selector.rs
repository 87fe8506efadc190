//! Tier selection.
//!
//! ## Lifecycle
//!
//! [`TierSelector::init`] is called once at process start and the resulting
//! selector is passed to request handlers (it is cheap to clone). It tries the
//! remote tier once, bounded by the connect timeout:
//!
//! - **Connected**: all traffic goes to Redis for the process lifetime.
//!   Per-call failures become misses/no-ops, never a runtime fallback.
//! - **Unavailable or disabled**: the in-process LRU serves everything.
//!
//! With [`ProbeMode::Startup`] the choice is final. With
//! [`ProbeMode::Interval`] a background task keeps retrying the connection
//! while the local tier is active; on success the selector switches to Redis
//! once and replays every tag and key invalidated during the outage, so
//! mutations made meanwhile are not masked by older remote entries.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::{CacheConfig, RemoteConfig};
use crate::entry::CacheEntry;
use crate::error::TierError;
use crate::tier::{CacheTier, LocalTier, LocalTierStats, RemoteTier, TierKind};

/// When the remote tier is (re)tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// One attempt at startup; a failed attempt means local for good.
    #[default]
    Startup,
    /// Keep retrying on this interval while running on the local tier.
    Interval(Duration),
}

enum ActiveTier {
    Local(Arc<LocalTier>),
    Remote(RemoteTier),
}

impl ActiveTier {
    fn tier(&self) -> &dyn CacheTier {
        match self {
            ActiveTier::Local(local) => local.as_ref(),
            ActiveTier::Remote(remote) => remote,
        }
    }
}

/// Invalidations made on the local tier while a probe is pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingInvalidations {
    tags: BTreeSet<String>,
    keys: BTreeSet<String>,
}

struct SelectorInner {
    active: ArcSwap<ActiveTier>,
    /// `Some` only while a probe may still promote the remote tier.
    pending: Mutex<Option<PendingInvalidations>>,
    probe: Mutex<Option<JoinHandle<()>>>,
}

/// Routes cache traffic to whichever tier was selected at startup.
#[derive(Clone)]
pub struct TierSelector {
    inner: Arc<SelectorInner>,
}

impl TierSelector {
    /// Select the active tier from configuration.
    ///
    /// Never fails: an unreachable remote tier is logged and the local tier is
    /// used instead.
    pub async fn init(config: &CacheConfig) -> Self {
        let local = Arc::new(LocalTier::with_capacity(config.local.capacity));

        if !config.remote.enabled {
            tracing::info!(
                capacity = config.local.capacity,
                "Remote cache disabled, using local tier only"
            );
            return Self::from_active(ActiveTier::Local(local), None);
        }

        tracing::info!(url = %config.remote.url, "Connecting to remote cache");
        match RemoteTier::connect(&config.remote).await {
            Ok(remote) => {
                tracing::info!(prefix = %remote.key_prefix(), "Connected to remote cache");
                Self::from_active(ActiveTier::Remote(remote), None)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    capacity = config.local.capacity,
                    "Remote cache unavailable. Falling back to local tier."
                );
                match config.remote.probe_mode() {
                    ProbeMode::Startup => Self::from_active(ActiveTier::Local(local), None),
                    ProbeMode::Interval(interval) => {
                        Self::probing(local, config.remote.clone(), interval)
                    }
                }
            }
        }
    }

    /// A selector pinned to a fresh local tier.
    pub fn local_only(capacity: usize) -> Self {
        Self::from_active(
            ActiveTier::Local(Arc::new(LocalTier::with_capacity(capacity))),
            None,
        )
    }

    /// Start on `local` and retry `remote` every `interval` until it connects.
    pub fn probing(local: Arc<LocalTier>, remote: RemoteConfig, interval: Duration) -> Self {
        let selector = Self::from_active(
            ActiveTier::Local(local),
            Some(PendingInvalidations::default()),
        );
        selector.spawn_probe(remote, interval);
        selector
    }

    /// A selector pinned to an already connected remote tier.
    pub fn remote(remote: RemoteTier) -> Self {
        Self::from_active(ActiveTier::Remote(remote), None)
    }

    fn from_active(active: ActiveTier, pending: Option<PendingInvalidations>) -> Self {
        Self {
            inner: Arc::new(SelectorInner {
                active: ArcSwap::from_pointee(active),
                pending: Mutex::new(pending),
                probe: Mutex::new(None),
            }),
        }
    }

    pub fn active_kind(&self) -> TierKind {
        self.inner.active.load().tier().kind()
    }

    pub fn is_remote_active(&self) -> bool {
        self.active_kind() == TierKind::Remote
    }

    /// Local tier statistics, when the local tier is the active one.
    pub fn local_stats(&self) -> Option<LocalTierStats> {
        match &**self.inner.active.load() {
            ActiveTier::Local(local) => {
                let stats = local.stats();
                crate::metrics::set_cache_entries(TierKind::Local.as_str(), stats.entries);
                Some(stats)
            }
            ActiveTier::Remote(_) => None,
        }
    }

    /// Look up an entry. Tier failures are reported as misses.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let active = self.inner.active.load_full();
        let tier = active.tier();
        match tier.get(key).await {
            Ok(Some(entry)) => {
                tracing::debug!(key = %key, tier = %tier.kind(), "cache hit");
                crate::metrics::record_cache_hit(tier.kind().as_str());
                Some(entry)
            }
            Ok(None) => {
                tracing::debug!(key = %key, tier = %tier.kind(), "cache miss");
                crate::metrics::record_cache_miss(tier.kind().as_str());
                None
            }
            Err(e) => {
                log_tier_error("get", key, &e);
                crate::metrics::record_cache_miss(tier.kind().as_str());
                None
            }
        }
    }

    /// Store an entry. Tier failures are logged and dropped.
    pub async fn set(&self, entry: CacheEntry) {
        let active = self.inner.active.load_full();
        let key = entry.key.clone();
        if let Err(e) = active.tier().set(entry).await {
            log_tier_error("set", &key, &e);
        }
    }

    /// Remove an entry. Tier failures are logged and reported as `false`.
    pub async fn delete(&self, key: &str) -> bool {
        {
            let mut pending = self.inner.pending.lock();
            let active = self.inner.active.load_full();
            if let ActiveTier::Local(local) = active.as_ref() {
                if let Some(pending) = pending.as_mut() {
                    pending.keys.insert(key.to_string());
                }
                return local.remove(key);
            }
        }
        let active = self.inner.active.load_full();
        match active.tier().delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                log_tier_error("delete", key, &e);
                false
            }
        }
    }

    /// Remove every entry tagged `tag` on the active tier.
    ///
    /// Unlike the other operations this returns the tier error, so that
    /// revalidation can report which tags failed.
    pub async fn delete_by_tag(&self, tag: &str) -> Result<usize, TierError> {
        {
            let mut pending = self.inner.pending.lock();
            let active = self.inner.active.load_full();
            if let ActiveTier::Local(local) = active.as_ref() {
                if let Some(pending) = pending.as_mut() {
                    pending.tags.insert(tag.to_string());
                }
                return Ok(local.remove_by_tag(tag));
            }
        }
        let active = self.inner.active.load_full();
        active.tier().delete_by_tag(tag).await
    }

    /// Stop the background probe, if any.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.probe.lock().take() {
            handle.abort();
        }
    }

    fn spawn_probe(&self, config: RemoteConfig, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(probe_loop(weak, config, interval));
        *self.inner.probe.lock() = Some(handle);
    }
}

async fn probe_loop(inner: Weak<SelectorInner>, config: RemoteConfig, interval: Duration) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Probing remote cache in the background"
    );
    loop {
        tokio::time::sleep(interval).await;
        if inner.strong_count() == 0 {
            return;
        }
        match RemoteTier::connect(&config).await {
            Ok(remote) => {
                if let Some(inner) = inner.upgrade() {
                    promote(&inner, remote).await;
                }
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Remote cache still unavailable");
            }
        }
    }
}

/// Switch to the remote tier and replay invalidations made while local.
async fn promote(inner: &SelectorInner, remote: RemoteTier) {
    let replay = {
        let mut pending = inner.pending.lock();
        inner
            .active
            .store(Arc::new(ActiveTier::Remote(remote.clone())));
        pending.take().unwrap_or_default()
    };
    tracing::info!(
        replayed_tags = replay.tags.len(),
        replayed_keys = replay.keys.len(),
        "Remote cache reachable, switched from local tier"
    );
    for tag in &replay.tags {
        if let Err(e) = remote.delete_by_tag(tag).await {
            tracing::warn!(tag = %tag, error = %e, "Failed to replay tag invalidation");
        }
    }
    for key in &replay.keys {
        if let Err(e) = remote.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to replay key invalidation");
        }
    }
}

fn log_tier_error(op: &'static str, key: &str, error: &TierError) {
    if error.is_timeout() {
        tracing::debug!(op, key = %key, error = %error, "remote cache call timed out");
    } else {
        tracing::warn!(op, key = %key, error = %error, "remote cache call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_only_routes_to_local() {
        let selector = TierSelector::local_only(8);
        assert_eq!(selector.active_kind(), TierKind::Local);
        assert!(!selector.is_remote_active());

        let entry = CacheEntry::new(
            "k",
            b"v".to_vec(),
            ["t".to_string()].into(),
            Duration::from_secs(60),
            Duration::from_secs(90),
        );
        selector.set(entry.clone()).await;
        assert_eq!(selector.get("k").await, Some(entry));
        assert_eq!(selector.delete_by_tag("t").await.unwrap(), 1);
        assert!(selector.get("k").await.is_none());
        assert_eq!(selector.local_stats().map(|s| s.entries), Some(0));
    }

    #[tokio::test]
    async fn test_pending_invalidations_recorded_only_while_probing() {
        let selector = TierSelector::from_active(
            ActiveTier::Local(Arc::new(LocalTier::with_capacity(4))),
            Some(PendingInvalidations::default()),
        );
        selector.delete_by_tag("surveys-s1").await.unwrap();
        selector.delete_by_tag("responses-r1").await.unwrap();
        // Recorded even when the local tier never held the key.
        assert!(!selector.delete("survey:s2").await);

        let pending = selector.inner.pending.lock().clone().unwrap();
        assert_eq!(
            pending.tags.into_iter().collect::<Vec<_>>(),
            vec!["responses-r1".to_string(), "surveys-s1".to_string()]
        );
        assert_eq!(
            pending.keys.into_iter().collect::<Vec<_>>(),
            vec!["survey:s2".to_string()]
        );

        let pinned = TierSelector::local_only(4);
        pinned.delete_by_tag("surveys-s1").await.unwrap();
        pinned.delete("survey:s2").await;
        assert!(pinned.inner.pending.lock().is_none());
    }
}
