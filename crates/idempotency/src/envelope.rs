//! Cache entry payload.

use common::Status;
use serde::{Deserialize, Serialize};

use crate::Result;

/// What is stored under a lookup key: either the classified error the
/// handler returned, or its success response tagged with the response type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedPayload {
    Error(Status),
    Response { type_url: String, bytes: Vec<u8> },
}

impl CachedPayload {
    /// Encodes the envelope into the bytes handed to the cache store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope read from the cache store.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
