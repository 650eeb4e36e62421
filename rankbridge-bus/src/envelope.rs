// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::BusError;

/// Message which can be sent over the invalidation bus.
pub trait BusMessage: Serialize + DeserializeOwned + Send + Sync {
    /// Type identifier written into the envelope.
    const TYPE: &'static str;

    /// Version of the body format. Receivers drop envelopes with a different version.
    const VERSION: u32;
}

/// Wire format of every message on the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub version: u32,
    pub message: serde_json::Value,
}

impl Envelope {
    pub fn new<M: BusMessage>(message: &M) -> Result<Self, BusError> {
        Ok(Self {
            message_type: M::TYPE.to_string(),
            version: M::VERSION,
            message: serde_json::to_value(message).map_err(BusError::Encode)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        serde_json::to_vec(self).map_err(BusError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(bytes).map_err(BusError::Decode)
    }

    /// Returns `true` if this envelope carries a message of type `M` in the expected version.
    pub fn is<M: BusMessage>(&self) -> bool {
        self.message_type == M::TYPE && self.version == M::VERSION
    }

    /// Decodes the body as a message of type `M`.
    ///
    /// Returns `None` if the envelope holds a different message type or version.
    pub fn decode_body<M: BusMessage>(&self) -> Result<Option<M>, BusError> {
        if !self.is::<M>() {
            return Ok(None);
        }
        let message = M::deserialize(&self.message).map_err(BusError::Decode)?;
        Ok(Some(message))
    }
}
