//! Byte-level encoding seam.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::TraitError;

/// Serialization/deserialization abstraction used by stores and the API.
pub trait Codec: Send + Sync {
    /// Encode value to bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, TraitError>;

    /// Decode bytes to value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TraitError>;

    /// Get content type header.
    fn content_type(&self) -> &'static str;
}
