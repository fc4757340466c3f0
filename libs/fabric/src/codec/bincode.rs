use ::bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::transport::DEFAULT_MAX_FRAME_LEN;

/// Bincode codec for binary serialization
///
/// Decoding refuses payloads that would allocate more than `limit` bytes.
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec {
    limit: u64,
}

impl BincodeCodec {
    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_LEN as u64)
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        ::bincode::DefaultOptions::new()
            .with_limit(self.limit)
            .serialize(value)
            .map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        ::bincode::DefaultOptions::new()
            .with_limit(self.limit)
            .deserialize(bytes)
            .map_err(|e| Error::Codec(e.to_string()))
    }
}
