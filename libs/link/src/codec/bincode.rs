use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Bincode codec for compact binary serialization
///
/// The binary payload travels as standard base64 so every frame stays a single line.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let bytes = bincode::serialize(value).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, line: &str) -> Result<T> {
        let bytes = STANDARD
            .decode(line.trim())
            .map_err(|e| Error::Codec(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}
