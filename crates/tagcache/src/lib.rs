//! # tagcache
//!
//! Tiered, tag-invalidated response cache.
//!
//! Expensive reads are wrapped by [`Cache::cached`]; the result is stored
//! with a set of tags and served until it goes stale, at which point it is
//! still returned while a background task recomputes it. Writers call
//! [`TagRegistry::revalidate`] to drop every entry carrying the tags of the
//! entity they changed.
//!
//! ## Tiers
//!
//! - [`tier::RemoteTier`]: Redis, shared by every instance. Every call is
//!   bounded by a sub-second timeout; failures degrade to a miss.
//! - [`tier::LocalTier`]: a capacity-bounded LRU with a tag index, used when
//!   Redis is disabled or unreachable at startup.
//!
//! [`TierSelector`] picks exactly one of them per process.
//!
//! ## Example
//!
//! ```ignore
//! use tagcache::{Cache, CacheOptions, TagIds, TagRegistry, TierSelector};
//! use tagcache::config::loader::load_config;
//! use tagcache::tags::kinds::RESPONSE;
//!
//! let config = load_config(None)?;
//! let selector = TierSelector::init(&config).await;
//! let cache = Cache::new(selector.clone(), config.ttl.policy());
//! let registry = TagRegistry::new(selector);
//!
//! let count: u64 = cache
//!     .cached(
//!         "responses:count:s1",
//!         &CacheOptions::new().tag("surveys-s1-responses"),
//!         || async { db.count_responses("s1").await },
//!     )
//!     .await?;
//!
//! // after a write:
//! registry
//!     .revalidate(&RESPONSE, &TagIds::new().with("id", "r1").with("surveyId", "s1"))
//!     .await;
//! ```

pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod facade;
pub mod metrics;
pub mod selector;
pub mod tags;
pub mod tier;

pub use codec::{Codec, JsonCodec, MessagePackCodec};
pub use config::CacheConfig;
pub use entry::{CacheEntry, ExpireAge, Freshness, TtlPolicy};
pub use error::{CacheError, CodecError, ConfigError, InvalidationError, TierError};
pub use facade::{Cache, CacheOptions};
pub use selector::{ProbeMode, TierSelector};
pub use tags::{EntityKind, RevalidateReport, TagIds, TagRegistry, TagTemplate};
pub use tier::{CacheTier, TierKind};
