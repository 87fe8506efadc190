//! Cache tiers: the in-process LRU and the shared Redis store.
//!
//! Both implement [`CacheTier`], so the selector and facade never care which
//! one answered.

pub mod local;
pub mod remote;

use std::fmt;

use async_trait::async_trait;

use crate::entry::CacheEntry;
use crate::error::TierError;

pub use local::{LocalTier, LocalTierStats};
pub use remote::RemoteTier;

/// Which physical backend a tier is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Local,
    Remote,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Local => "local",
            TierKind::Remote => "remote",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform operation set of a cache tier.
///
/// Entries returned by `get` may be stale; only hard-expired entries are
/// reported as misses. Freshness decisions belong to the facade.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// Look up an entry by key.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, TierError>;

    /// Store an entry under its own key, replacing any previous entry and its
    /// tag memberships.
    async fn set(&self, entry: CacheEntry) -> Result<(), TierError>;

    /// Remove an entry. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> Result<bool, TierError>;

    /// Remove every entry carrying `tag`. Returns the number of entries removed.
    async fn delete_by_tag(&self, tag: &str) -> Result<usize, TierError>;
}
