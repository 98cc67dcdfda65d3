//! # StratLab Ext JSON
//!
//! JSON encoding for StratLab.
//!
//! - [`JsonCodec`] / [`PrettyJsonCodec`]: [`Codec`] implementations used to
//!   encode records in the redb result store
//! - [`ResultCodec`]: packages a [`RiskReport`](stratlab_risk::RiskReport)
//!   into a transport-safe [`AnalysisResult`](stratlab_traits::AnalysisResult)
//!   and back

#![warn(missing_docs)]
#![warn(clippy::all)]

mod result;

pub use result::{canonicalize, ResultCodec};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use stratlab_traits::error::TraitError;
use stratlab_traits::transport::Codec;

/// JSON codec using serde_json.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, TraitError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| TraitError::SerializationError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TraitError> {
        serde_json::from_slice(bytes).map_err(|e| TraitError::ParseError(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Pretty-printing JSON codec (for debugging).
#[derive(Debug, Clone, Default)]
pub struct PrettyJsonCodec;

impl PrettyJsonCodec {
    /// Create a new pretty JSON codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for PrettyJsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, TraitError> {
        serde_json::to_vec_pretty(value)
            .map(Bytes::from)
            .map_err(|e| TraitError::SerializationError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TraitError> {
        serde_json::from_slice(bytes).map_err(|e| TraitError::ParseError(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
