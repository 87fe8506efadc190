//! Cache entries and the TTL policy that stamps them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Current wall-clock time as Unix epoch milliseconds.
///
/// Entries are shared between processes through the remote tier, so their
/// deadlines are absolute wall-clock values rather than `Instant`s.
pub fn now_millis() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as i64
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Freshness of an entry at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Before `stale_at`: serve as-is.
    Fresh,
    /// Between `stale_at` and `expire_at`: serve and refresh in the background.
    Stale,
    /// At or past `expire_at`: treat as a miss.
    Expired,
}

/// A cached computation result.
///
/// The payload is wrapped in `Arc` so cache hits on the local tier hand out
/// the bytes without copying them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Arc<Vec<u8>>,
    pub tags: BTreeSet<String>,
    /// Soft expiry, epoch millis.
    pub stale_at: i64,
    /// Hard expiry, epoch millis. Always `>= stale_at`.
    pub expire_at: i64,
}

impl CacheEntry {
    /// Create an entry that becomes stale after `stale_age` and expires after
    /// `expire_age`, both measured from now.
    pub fn new(
        key: impl Into<String>,
        payload: Vec<u8>,
        tags: BTreeSet<String>,
        stale_age: Duration,
        expire_age: Duration,
    ) -> Self {
        Self::at(key, payload, tags, now_millis(), stale_age, expire_age)
    }

    /// Like [`CacheEntry::new`] with an explicit creation time.
    pub fn at(
        key: impl Into<String>,
        payload: Vec<u8>,
        tags: BTreeSet<String>,
        created_at: i64,
        stale_age: Duration,
        expire_age: Duration,
    ) -> Self {
        let stale_at = created_at.saturating_add(duration_millis(stale_age));
        let expire_at = created_at
            .saturating_add(duration_millis(expire_age))
            .max(stale_at);
        Self {
            key: key.into(),
            payload: Arc::new(payload),
            tags,
            stale_at,
            expire_at,
        }
    }

    pub fn freshness(&self, now: i64) -> Freshness {
        if now < self.stale_at {
            Freshness::Fresh
        } else if now < self.expire_at {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Check if this entry has passed its hard expiry.
    pub fn is_expired(&self) -> bool {
        self.freshness(now_millis()) == Freshness::Expired
    }

    /// Time left until hard expiry, or `None` once expired.
    pub fn remaining(&self, now: i64) -> Option<Duration> {
        let left = self.expire_at.saturating_sub(now);
        (left > 0).then(|| Duration::from_millis(left as u64))
    }
}

/// The expiry-estimation function: maps a stale age to a hard expiry age.
#[derive(Clone)]
pub enum ExpireAge {
    /// `stale_age * factor`.
    Multiplier(f64),
    /// `stale_age + offset`.
    Offset(Duration),
    /// Arbitrary estimator supplied in code.
    Custom(Arc<dyn Fn(Duration) -> Duration + Send + Sync>),
}

impl ExpireAge {
    /// Hard expiry age for `stale_age`. Never shorter than `stale_age`.
    pub fn estimate(&self, stale_age: Duration) -> Duration {
        let estimate = match self {
            ExpireAge::Multiplier(factor) if factor.is_finite() && *factor > 0.0 => {
                Duration::try_from_secs_f64(stale_age.as_secs_f64() * factor)
                    .unwrap_or(Duration::MAX)
            }
            ExpireAge::Multiplier(_) => stale_age,
            ExpireAge::Offset(offset) => stale_age.saturating_add(*offset),
            ExpireAge::Custom(f) => f(stale_age),
        };
        estimate.max(stale_age)
    }
}

impl Default for ExpireAge {
    fn default() -> Self {
        ExpireAge::Multiplier(1.5)
    }
}

impl fmt::Debug for ExpireAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpireAge::Multiplier(factor) => f.debug_tuple("Multiplier").field(factor).finish(),
            ExpireAge::Offset(offset) => f.debug_tuple("Offset").field(offset).finish(),
            ExpireAge::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Default stale age plus the estimator for hard expiry.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub default_stale_age: Duration,
    pub expire_age: ExpireAge,
}

impl TtlPolicy {
    pub fn new(default_stale_age: Duration, expire_age: ExpireAge) -> Self {
        Self {
            default_stale_age,
            expire_age,
        }
    }

    /// Resolve `(stale_age, expire_age)` for a write, using the default stale
    /// age when the call does not override it.
    pub fn ages(&self, stale_age: Option<Duration>) -> (Duration, Duration) {
        let stale = stale_age.unwrap_or(self.default_stale_age);
        (stale, self.expire_age.estimate(stale))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), ExpireAge::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_freshness_windows() {
        let entry = CacheEntry::at(
            "k",
            vec![1],
            tags(&["x"]),
            1_000,
            Duration::from_millis(100),
            Duration::from_millis(300),
        );
        assert_eq!(entry.stale_at, 1_100);
        assert_eq!(entry.expire_at, 1_300);
        assert_eq!(entry.freshness(1_099), Freshness::Fresh);
        assert_eq!(entry.freshness(1_100), Freshness::Stale);
        assert_eq!(entry.freshness(1_299), Freshness::Stale);
        assert_eq!(entry.freshness(1_300), Freshness::Expired);
        assert_eq!(entry.remaining(1_250), Some(Duration::from_millis(50)));
        assert_eq!(entry.remaining(1_300), None);
    }

    #[test]
    fn test_expire_never_precedes_stale() {
        let entry = CacheEntry::at(
            "k",
            vec![],
            BTreeSet::new(),
            0,
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        assert_eq!(entry.expire_at, entry.stale_at);
    }

    #[test]
    fn test_expire_age_estimators() {
        let stale = Duration::from_secs(60);
        assert_eq!(ExpireAge::Multiplier(2.0).estimate(stale), Duration::from_secs(120));
        assert_eq!(ExpireAge::Multiplier(0.5).estimate(stale), stale);
        assert_eq!(ExpireAge::Multiplier(f64::NAN).estimate(stale), stale);
        assert_eq!(
            ExpireAge::Offset(Duration::from_secs(30)).estimate(stale),
            Duration::from_secs(90)
        );
        let custom = ExpireAge::Custom(Arc::new(|s: Duration| s * 3));
        assert_eq!(custom.estimate(stale), Duration::from_secs(180));
    }

    #[test]
    fn test_ttl_policy_override() {
        let policy = TtlPolicy::new(Duration::from_secs(100), ExpireAge::Multiplier(1.5));
        assert_eq!(
            policy.ages(None),
            (Duration::from_secs(100), Duration::from_secs(150))
        );
        assert_eq!(
            policy.ages(Some(Duration::from_secs(10))),
            (Duration::from_secs(10), Duration::from_secs(15))
        );
    }
}
