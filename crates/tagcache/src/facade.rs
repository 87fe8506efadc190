//! Function-wrapping cache entry point for request handlers.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::{Codec, MessagePackCodec};
use crate::entry::{CacheEntry, Freshness, TtlPolicy, now_millis};
use crate::error::{CacheError, CodecError};
use crate::selector::TierSelector;
use crate::tags::{RevalidateReport, invalidate_tags};

/// Per-call options: invalidation tags and an optional stale-age override.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    tags: BTreeSet<String>,
    stale_age: Option<Duration>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one invalidation tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add several invalidation tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Override the policy's default stale age for this call.
    pub fn stale_age(mut self, stale_age: Duration) -> Self {
        self.stale_age = Some(stale_age);
        self
    }

    pub fn tag_set(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

/// The cache facade.
///
/// Wraps an expensive computation keyed by a cache key. Cheap to clone; clones
/// share the same tiers.
#[derive(Clone)]
pub struct Cache<C: Codec = MessagePackCodec> {
    selector: TierSelector,
    codec: C,
    ttl: TtlPolicy,
    /// Keys with a background refresh in flight.
    refreshing: Arc<Mutex<HashSet<String>>>,
}

/// Clears a key's in-flight refresh marker when the refresh task ends,
/// including when it panics or is cancelled.
struct RefreshGuard {
    refreshing: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing.lock().remove(&self.key);
    }
}

impl Cache<MessagePackCodec> {
    /// Create a cache using MessagePack payloads.
    pub fn new(selector: TierSelector, ttl: TtlPolicy) -> Self {
        Self::with_codec(selector, MessagePackCodec, ttl)
    }
}

impl<C: Codec> Cache<C> {
    pub fn with_codec(selector: TierSelector, codec: C, ttl: TtlPolicy) -> Self {
        Self {
            selector,
            codec,
            ttl,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn selector(&self) -> &TierSelector {
        &self.selector
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// - **Fresh hit**: decoded and returned; `compute` is not called.
    /// - **Stale hit**: the stale value is returned at once and `compute` runs
    ///   in a detached task that rewrites the entry. At most one refresh per
    ///   key runs at a time across clones of this `Cache`; stale reads that
    ///   arrive while one is in flight drop their `compute`.
    /// - **Miss or hard expiry**: `compute` runs on the caller's task and the
    ///   result is written with `options`' tags.
    ///
    /// Concurrent misses on the same key each run `compute`; there is no
    /// single-flight deduplication, so a cold key may be computed more than
    /// once. The last write wins.
    ///
    /// A failing `compute` yields [`CacheError::Compute`] and writes nothing.
    /// A value the codec cannot encode yields [`CacheError::Uncacheable`],
    /// which still carries the computed value.
    pub async fn cached<T, E, F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        compute: F,
    ) -> Result<T, CacheError<T, E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(entry) = self.selector.get(key).await {
            match entry.freshness(now_millis()) {
                Freshness::Fresh => {
                    if let Some(value) = self.decode_entry(&entry).await {
                        return Ok(value);
                    }
                }
                Freshness::Stale => {
                    if let Some(value) = self.decode_entry(&entry).await {
                        crate::metrics::record_stale_hit();
                        tracing::debug!(key = %key, "serving stale entry, refreshing in background");
                        self.spawn_refresh(key, options, compute);
                        return Ok(value);
                    }
                }
                Freshness::Expired => {}
            }
        }

        let value = compute().await.map_err(CacheError::Compute)?;
        match self.prepare_entry(key, options, &value) {
            Ok(entry) => {
                self.selector.set(entry).await;
                Ok(value)
            }
            Err(source) => {
                tracing::warn!(key = %key, error = %source, "computed value is not cacheable");
                Err(CacheError::Uncacheable { value, source })
            }
        }
    }

    /// Remove a single entry by key.
    pub async fn invalidate_key(&self, key: &str) -> bool {
        self.selector.delete(key).await
    }

    /// Invalidate every entry carrying any of `tags`, best-effort per tag.
    pub async fn revalidate_tags<I, S>(&self, tags: I) -> RevalidateReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        invalidate_tags(&self.selector, tags).await
    }

    /// Decode a stored payload. A payload that no longer decodes (corrupt, or
    /// written by an older version of the type) is deleted and treated as a
    /// miss.
    async fn decode_entry<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Option<T> {
        match self.codec.decode(&entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "Failed to decode cached value");
                self.selector.delete(&entry.key).await;
                None
            }
        }
    }

    /// Encode a value into an entry stamped with the TTL policy.
    fn prepare_entry<T: Serialize>(
        &self,
        key: &str,
        options: &CacheOptions,
        value: &T,
    ) -> Result<CacheEntry, CodecError> {
        let payload = self.codec.encode(value)?;
        if options.tags.is_empty() {
            tracing::debug!(key = %key, "caching untagged entry, relies on TTL expiry");
        }
        let (stale_age, expire_age) = self.ttl.ages(options.stale_age);
        Ok(CacheEntry::new(
            key,
            payload,
            options.tags.clone(),
            stale_age,
            expire_age,
        ))
    }

    fn spawn_refresh<T, E, F, Fut>(&self, key: &str, options: &CacheOptions, compute: F)
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if !self.refreshing.lock().insert(key.to_string()) {
            tracing::trace!(key = %key, "refresh already in flight");
            return;
        }
        let guard = RefreshGuard {
            refreshing: Arc::clone(&self.refreshing),
            key: key.to_string(),
        };
        let cache = self.clone();
        let key = key.to_string();
        let options = options.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match compute().await {
                Ok(value) => match cache.prepare_entry(&key, &options, &value) {
                    Ok(entry) => {
                        cache.selector.set(entry).await;
                        tracing::debug!(key = %key, "background refresh stored");
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "refreshed value is not cacheable");
                    }
                },
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Background refresh failed, keeping stale entry");
                }
            }
        });
    }
}
