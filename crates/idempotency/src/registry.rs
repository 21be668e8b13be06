//! Closed mapping from response type identifiers to decoders.

use std::any::Any;
use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::{CacheError, CachedPayload, Result};

/// A response type that can be cached and replayed.
pub trait CacheableResponse: Serialize + DeserializeOwned + Send + 'static {
    /// Stable identifier written into the cache entry.
    const TYPE_URL: &'static str;
}

type Decoder = fn(&[u8]) -> Result<Box<dyn Any + Send>>;

fn decode_as<T: CacheableResponse>(bytes: &[u8]) -> Result<Box<dyn Any + Send>> {
    Ok(Box::new(serde_json::from_slice::<T>(bytes)?))
}

/// Registry of the response types the interceptor may cache.
///
/// Built once at start-up; responses of unregistered types are never cached
/// and cached entries naming unknown types are never decoded.
#[derive(Debug, Default)]
pub struct ResponseRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl ResponseRegistry {
    /// Creates a builder for a registry.
    pub fn builder() -> ResponseRegistryBuilder {
        ResponseRegistryBuilder::default()
    }

    /// Returns true if the type identifier has a decoder.
    pub fn contains(&self, type_url: &str) -> bool {
        self.decoders.contains_key(type_url)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Wraps a response in a type-tagged envelope.
    pub fn encode<T: CacheableResponse>(&self, response: &T) -> Result<CachedPayload> {
        if !self.contains(T::TYPE_URL) {
            return Err(CacheError::UnknownType(T::TYPE_URL.to_string()));
        }
        Ok(CachedPayload::Response {
            type_url: T::TYPE_URL.to_string(),
            bytes: serde_json::to_vec(response)?,
        })
    }

    /// Decodes tagged bytes with the registered decoder and checks the result
    /// is a `T`.
    pub fn decode<T: CacheableResponse>(&self, type_url: &str, bytes: &[u8]) -> Result<T> {
        let decoder = self
            .decoders
            .get(type_url)
            .ok_or_else(|| CacheError::UnknownType(type_url.to_string()))?;

        decoder(bytes)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CacheError::TypeMismatch {
                expected: T::TYPE_URL,
                actual: type_url.to_string(),
            })
    }
}

/// Builder for [`ResponseRegistry`].
#[derive(Debug, Default)]
pub struct ResponseRegistryBuilder {
    decoders: HashMap<&'static str, Decoder>,
}

impl ResponseRegistryBuilder {
    /// Registers a response type.
    pub fn register<T: CacheableResponse>(mut self) -> Self {
        self.decoders.insert(T::TYPE_URL, decode_as::<T> as Decoder);
        self
    }

    pub fn build(self) -> ResponseRegistry {
        ResponseRegistry {
            decoders: self.decoders,
        }
    }
}
