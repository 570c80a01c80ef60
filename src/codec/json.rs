//! JSON codec using `serde_json`.
//!
//! Tool payloads are UTF-8 JSON objects carrying at least a `command`
//! field; replies mirror `command` and add `result` and optionally `data`.
//!
//! # Example
//!
//! ```
//! use devtools_remote::codec::JsonCodec;
//! use serde_json::{json, Value};
//!
//! let encoded = JsonCodec::encode(&json!({"command": "ping"})).unwrap();
//! let decoded: Value = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded["command"], "ping");
//! ```

use crate::error::Result;

/// JSON codec for tool payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
