//! Error types for the cache subsystem.
//!
//! Only two of these ever reach application code: [`CacheError::Compute`]
//! (the caller's own failure, passed through) and [`CacheError::Uncacheable`]
//! (the value could not be encoded, but is still handed back). Tier failures
//! are absorbed by the selector and surface as misses or no-ops.

/// Errors raised by a single cache tier operation.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The remote store could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The operation exceeded its time budget.
    #[error("Remote operation '{op}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation name (`get`, `set`, `delete`, `delete_by_tag`, `connect`).
        op: &'static str,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// The remote store answered with an error.
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A stored entry envelope could not be read or written.
    #[error("Envelope error: {message}")]
    Envelope {
        /// Description of the envelope failure.
        message: String,
    },
}

impl TierError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Envelope` error.
    #[must_use]
    pub fn envelope(message: impl Into<String>) -> Self {
        Self::Envelope {
            message: message.into(),
        }
    }

    /// Returns `true` for timeouts, which are logged at debug level only.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors raised by a [`Codec`](crate::codec::Codec).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value contains something the codec has no encoding for.
    #[error("{codec} cannot encode value: {message}")]
    Encode {
        codec: &'static str,
        message: String,
    },

    /// The bytes are not a valid encoding of the requested type.
    #[error("{codec} cannot decode value: {message}")]
    Decode {
        codec: &'static str,
        message: String,
    },
}

impl CodecError {
    #[must_use]
    pub fn encode(codec: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            codec,
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn decode(codec: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            codec,
            message: err.to_string(),
        }
    }
}

/// Failure of [`Cache::cached`](crate::facade::Cache::cached).
///
/// `T` is the cached value type and `E` the compute function's error type.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<T, E> {
    /// The compute function failed. Nothing was written.
    #[error("compute failed: {0}")]
    Compute(E),

    /// The value was computed but could not be encoded, so it was not cached.
    /// The computed value is carried along and can be taken back with
    /// [`CacheError::into_value`].
    #[error("value is not cacheable: {source}")]
    Uncacheable {
        value: T,
        #[source]
        source: CodecError,
    },
}

impl<T, E> CacheError<T, E> {
    /// Recovers the computed value when only the caching side effect failed.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Compute(_) => None,
            Self::Uncacheable { value, .. } => Some(value),
        }
    }

    /// Returns the compute error, if that is what failed.
    pub fn compute_error(&self) -> Option<&E> {
        match self {
            Self::Compute(e) => Some(e),
            Self::Uncacheable { .. } => None,
        }
    }
}

/// A single tag that could not be invalidated during a revalidate call.
#[derive(Debug, thiserror::Error)]
#[error("failed to invalidate tag '{tag}': {source}")]
pub struct InvalidationError {
    pub tag: String,
    #[source]
    pub source: TierError,
}

/// Configuration loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
