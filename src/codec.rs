//! Pluggable serializer for opaque container columns.
//!
//! Homogeneous containers of primitives (lists, sets, maps, tuples) are not
//! decomposed relationally - they are stored as a single BLOB cell. The byte
//! format is owned by the codec injected at registry construction, with
//! `serde_json::Value` as the interchange representation between the model
//! layer and the codec.

use crate::Result;

/// Encodes and decodes opaque container payloads.
///
/// Implementations must round-trip: `decode(encode(v)) == v`.
pub trait BlobCodec: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value>;
}

/// Default codec: compact JSON bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl BlobCodec for JsonCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonCodec;
        let value = serde_json::json!({"a": [1, 2, 3], "b": "text"});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }
}
