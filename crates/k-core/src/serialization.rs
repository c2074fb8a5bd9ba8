use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("no codec registered for type {type_name}")]
    NoCodecRegistered { type_name: &'static str },

    #[error("failed to encode payload: {0}")]
    EncodeFailed(#[source] serde_json::Error),

    #[error("failed to decode payload: {0}")]
    DecodeFailed(#[source] serde_json::Error),
}

/// A codec bound to a single Rust type `T`. The registry stores these
/// behind `Any` so a single `HashMap` can hold codecs for arbitrarily many
/// message types.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, SerializationError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// The only codec shipped out of the box. Additional codecs (e.g. a binary
/// format) can be registered by implementing [`Codec`] and calling
/// [`SerializationRegistry::register`].
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned + Send + Sync> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(SerializationError::EncodeFailed)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(bytes).map_err(SerializationError::DecodeFailed)
    }
}

/// Type-keyed codec registry. Rust has no reified generics, so each
/// registration is boxed behind `Any` and downcast back to `Arc<dyn
/// Codec<T>>` on lookup; the downcast can only fail if the registry is
/// misused across type boundaries it wasn't built for, which `register`/
/// `codec_for` keep from happening by construction.
#[derive(Default)]
pub struct SerializationRegistry {
    codecs: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    type_names: HashMap<TypeId, &'static str>,
}

impl SerializationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec for `T`, registering [`JsonCodec`] for every type
    /// that hasn't been given an explicit one is the caller's
    /// responsibility via [`Self::with_default_json`].
    pub fn register<T: 'static>(&mut self, codec: impl Codec<T> + 'static) {
        let id = TypeId::of::<T>();
        self.codecs.insert(id, Box::new(Arc::new(codec) as Arc<dyn Codec<T>>));
        self.type_names.insert(id, std::any::type_name::<T>());
    }

    pub fn with_default_json<T: Serialize + DeserializeOwned + Send + Sync + 'static>(
        mut self,
    ) -> Self {
        self.register::<T>(JsonCodec);
        self
    }

    pub fn codec_for<T: 'static>(&self) -> Result<Arc<dyn Codec<T>>, SerializationError> {
        let id = TypeId::of::<T>();
        self.codecs
            .get(&id)
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn Codec<T>>>())
            .cloned()
            .ok_or(SerializationError::NoCodecRegistered {
                type_name: self.type_names.get(&id).copied().unwrap_or("<unknown>"),
            })
    }

    pub fn encode<T: 'static>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        self.codec_for::<T>()?.encode(value)
    }

    pub fn decode<T: 'static>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        self.codec_for::<T>()?.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        name: String,
    }

    #[test]
    fn round_trips_through_registered_json_codec() {
        let registry = SerializationRegistry::new().with_default_json::<Order>();
        let order = Order { id: 1, name: "widget".into() };
        let bytes = registry.encode(&order).unwrap();
        let decoded: Order = registry.decode(&bytes).unwrap();
        assert_eq!(order, decoded);
    }

    #[test]
    fn missing_codec_is_reported_by_type_name() {
        let registry = SerializationRegistry::new();
        let err = registry.encode(&Order { id: 1, name: "x".into() }).unwrap_err();
        match err {
            SerializationError::NoCodecRegistered { type_name } => {
                assert!(type_name.contains("Order"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
