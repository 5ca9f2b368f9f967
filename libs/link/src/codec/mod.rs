use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod bincode;
pub mod json;

pub use self::bincode::BincodeCodec;
pub use self::json::JsonCodec;

/// Codec trait for turning messages into single lines of text and back
///
/// Encoded text must never contain a raw `\n`: one line on the wire is one message.
pub trait Codec: Send + Sync + 'static {
    /// Encode a value into one line of text
    fn encode<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Decode one line of text into a value
    fn decode<T: for<'de> Deserialize<'de>>(&self, line: &str) -> Result<T>;
}
