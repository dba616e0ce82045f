//! The AMF0 encoding, escaping to AMF3 for values it cannot carry.

mod decode;
mod encode;

use bytes::Bytes;

pub use self::decode::Amf0Decoder;
pub use self::encode::Amf0Encoder;
use crate::context::SerializationContext;
use crate::value::Value;
use crate::{AmfReadError, AmfWriteError};

/// Decode exactly one AMF0 value.
pub fn decode(buffer: Bytes, context: &SerializationContext) -> Result<Value, AmfReadError> {
    let mut decoder = Amf0Decoder::new(buffer, context);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(AmfReadError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}

/// Encode one value as AMF0.
pub fn encode(value: &Value, context: &SerializationContext) -> Result<Bytes, AmfWriteError> {
    let mut encoder = Amf0Encoder::new(context);
    encoder.encode(value)?;
    Ok(encoder.take_bytes())
}
