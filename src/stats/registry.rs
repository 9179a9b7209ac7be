use std::collections::HashMap;

use prost::Message;
use prost_types::Any;

use super::cgroups::Metrics;
use super::{Error, Result};

/// Type URL containerd attaches to cgroups v1 task metrics.
pub const CGROUPS_V1_METRICS: &str = "io.containerd.cgroups.v1.Metrics";

/// Decodes the raw bytes of a payload into a [`Metrics`] snapshot.
pub type DecodeFn = fn(&[u8]) -> std::result::Result<Metrics, prost::DecodeError>;

/// Maps payload type URLs to their decode function.
///
/// Decoding fails closed: a type URL without a registered decoder is an error, never a guess.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    decoders: HashMap<String, DecodeFn>,
}

impl Registry {
    /// Creates a registry knowing every payload type the check understands out of the box.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(CGROUPS_V1_METRICS, decode_cgroups_v1);
        registry
    }

    /// Registers `decode` for `type_url`, replacing a previous registration.
    pub fn register(&mut self, type_url: impl Into<String>, decode: DecodeFn) -> &mut Self {
        self.decoders.insert(type_url.into(), decode);
        self
    }

    pub fn is_registered(&self, type_url: &str) -> bool {
        self.decoders.contains_key(type_url)
    }

    /// Decodes `payload` with the decoder registered for its type URL.
    ///
    /// # Errors
    ///
    /// * [`Error::TypeNotFound`] if no decoder is registered for the type URL.
    /// * [`Error::Decode`] if the bytes are not a valid encoding of the registered type.
    pub fn decode(&self, payload: &Any) -> Result<Metrics> {
        let decode = self
            .decoders
            .get(payload.type_url.as_str())
            .ok_or_else(|| Error::TypeNotFound {
                type_url: payload.type_url.clone(),
            })?;

        decode(payload.value.as_slice()).map_err(|source| Error::Decode {
            type_url: payload.type_url.clone(),
            source,
        })
    }
}

fn decode_cgroups_v1(buf: &[u8]) -> std::result::Result<Metrics, prost::DecodeError> {
    Metrics::decode(buf)
}
