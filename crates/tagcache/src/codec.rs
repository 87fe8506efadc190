//! Pluggable value codecs.
//!
//! The facade is generic over [`Codec`], so the payload format can be swapped
//! without touching the tiers. [`MessagePackCodec`] is the default: it keeps
//! struct field names (so absent `Option` fields with
//! `skip_serializing_if` still decode) and carries the full `u64`/`i64`
//! range, dates, sets and nested maps through their `serde` impls.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Converts structured values to and from stored payload bytes.
///
/// Implementations must be round-trip safe: `decode(encode(v)) == v` for every
/// value they accept. Values they cannot represent fail with
/// [`CodecError::Encode`] rather than being silently altered.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

/// MessagePack with named struct fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::encode(self.name(), e))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::decode(self.name(), e))
    }
}

/// JSON, for payloads that other tooling needs to read.
///
/// Stricter than MessagePack: map keys must be strings or integers and
/// floats must be finite.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(|e| CodecError::encode(self.name(), e))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(self.name(), e))
    }
}
