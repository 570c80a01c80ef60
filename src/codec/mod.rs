//! Codec module - serialization/deserialization for payloads.
//!
//! - [`JsonCodec`] - JSON using `serde_json`, the payload convention of
//!   every tool served here
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod json;

pub use json::JsonCodec;
