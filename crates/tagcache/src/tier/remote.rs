//! Redis-backed shared tier.
//!
//! ## Key layout
//!
//! ```text
//! {prefix}{key}              MessagePack envelope, PX = time to hard expiry
//! {prefix}__tags__:{tag}     SET of full entry keys carrying the tag
//! ```
//!
//! Every call is bounded by the configured per-operation timeout. Errors are
//! returned to the selector, which turns them into misses or no-ops.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{CacheTier, TierKind};
use crate::config::RemoteConfig;
use crate::entry::{CacheEntry, now_millis};
use crate::error::TierError;

/// Deletes every key in a tag set and the set itself, atomically, so a key
/// added concurrently is either deleted or keeps its membership.
const PURGE_TAG_SCRIPT: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
local removed = 0
for i = 1, #members, 500 do
    removed = removed + redis.call('DEL', unpack(members, i, math.min(i + 499, #members)))
end
redis.call('DEL', KEYS[1])
return removed
"#;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    tags: &'a BTreeSet<String>,
    stale_at: i64,
    expire_at: i64,
    #[serde(with = "serde_bytes")]
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct Envelope {
    tags: BTreeSet<String>,
    stale_at: i64,
    expire_at: i64,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

/// Client for the shared key-value store.
#[derive(Clone)]
pub struct RemoteTier {
    pool: Pool,
    key_prefix: Arc<str>,
    op_timeout: Duration,
    purge_script: Arc<redis::Script>,
}

impl RemoteTier {
    /// Connect to Redis, bounded by the configured connect timeout.
    ///
    /// This is the only connect attempt the tier makes on its own; the caller
    /// decides whether to fall back or retry later.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, TierError> {
        let connect_timeout = config.connect_timeout();
        let op_timeout = config.op_timeout();

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size.max(1));
        pool_config.timeouts.wait = Some(op_timeout);
        pool_config.timeouts.create = Some(connect_timeout);
        pool_config.timeouts.recycle = Some(op_timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TierError::connection(format!("failed to create Redis pool: {e}")))?;

        let tier = Self {
            pool,
            key_prefix: Arc::from(config.key_prefix.as_str()),
            op_timeout,
            purge_script: Arc::new(redis::Script::new(PURGE_TAG_SCRIPT)),
        };

        match tokio::time::timeout(connect_timeout, tier.ping_unbounded()).await {
            Ok(Ok(())) => Ok(tier),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TierError::Timeout {
                op: "connect",
                timeout_ms: connect_timeout.as_millis() as u64,
            }),
        }
    }

    /// Check the connection (for health checks).
    pub async fn ping(&self) -> Result<(), TierError> {
        self.bounded("ping", self.ping_unbounded()).await
    }

    async fn ping_unbounded(&self) -> Result<(), TierError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Build the full key with prefix.
    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    /// Build the tag set key.
    fn tag_key(&self, tag: &str) -> String {
        format!("{}__tags__:{tag}", self.key_prefix)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, TierError> {
        self.pool
            .get()
            .await
            .map_err(|e| TierError::connection(format!("failed to get Redis connection: {e}")))
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, TierError>
    where
        F: Future<Output = Result<T, TierError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout {
                op,
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }
}

fn encode_envelope(entry: &CacheEntry) -> Result<Vec<u8>, TierError> {
    let envelope = EnvelopeRef {
        tags: &entry.tags,
        stale_at: entry.stale_at,
        expire_at: entry.expire_at,
        payload: entry.payload.as_slice(),
    };
    rmp_serde::to_vec_named(&envelope)
        .map_err(|e| TierError::envelope(format!("failed to encode entry: {e}")))
}

fn decode_envelope(key: &str, bytes: &[u8]) -> Result<CacheEntry, TierError> {
    let envelope: Envelope = rmp_serde::from_slice(bytes)
        .map_err(|e| TierError::envelope(format!("failed to decode entry '{key}': {e}")))?;
    Ok(CacheEntry {
        key: key.to_string(),
        payload: Arc::new(envelope.payload),
        tags: envelope.tags,
        stale_at: envelope.stale_at,
        expire_at: envelope.expire_at,
    })
}

#[async_trait]
impl CacheTier for RemoteTier {
    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, TierError> {
        self.bounded("get", async {
            let mut conn = self.conn().await?;
            let data: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
            let Some(bytes) = data else {
                return Ok(None);
            };
            let entry = decode_envelope(key, &bytes)?;
            // Redis expiry has millisecond granularity; do not hand out an
            // entry that is past its own deadline.
            Ok((entry.expire_at > now_millis()).then_some(entry))
        })
        .await
    }

    /// Writes the entry and adds it to each of its tag sets in one atomic
    /// pipeline. Tag sets are kept alive at least as long as their longest
    /// member (`PEXPIRE NX` then `GT`, Redis 7+).
    ///
    /// Replacing an entry does not remove it from tag sets it no longer
    /// carries, so an old tag can still invalidate it. That errs towards
    /// invalidating too much, never too little.
    async fn set(&self, entry: CacheEntry) -> Result<(), TierError> {
        let Some(ttl) = entry.remaining(now_millis()) else {
            return Ok(());
        };
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let bytes = encode_envelope(&entry)?;
        let full_key = self.full_key(&entry.key);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&full_key)
            .arg(bytes)
            .arg("PX")
            .arg(ttl_ms)
            .ignore();
        for tag in &entry.tags {
            let tag_key = self.tag_key(tag);
            pipe.cmd("SADD").arg(&tag_key).arg(&full_key).ignore();
            pipe.cmd("PEXPIRE")
                .arg(&tag_key)
                .arg(ttl_ms)
                .arg("NX")
                .ignore();
            pipe.cmd("PEXPIRE")
                .arg(&tag_key)
                .arg(ttl_ms)
                .arg("GT")
                .ignore();
        }

        self.bounded("set", async {
            let mut conn = self.conn().await?;
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, TierError> {
        self.bounded("delete", async {
            let mut conn = self.conn().await?;
            let removed: i64 = conn.del(self.full_key(key)).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_by_tag(&self, tag: &str) -> Result<usize, TierError> {
        self.bounded("delete_by_tag", async {
            let mut conn = self.conn().await?;
            let removed: usize = self
                .purge_script
                .key(self.tag_key(tag))
                .invoke_async(&mut conn)
                .await?;
            Ok(removed)
        })
        .await
    }
}
