//! Text encoding used for reliable message payloads
//!
//! Message text travels as UTF-16 code units, two little-endian bytes per
//! unit, which is what the browser/Unity clients put into reliable messages.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Encode raw UTF-16 code units into a message payload
pub fn encode_wire_units(units: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(units.len() * 2);
    for unit in units {
        buf.put_u16_le(*unit);
    }
    buf.freeze()
}

/// Decode a message payload into raw UTF-16 code units
///
/// Every 16-bit value is preserved, including unpaired surrogates.
pub fn decode_wire_units(payload: &[u8]) -> Result<Vec<u16>> {
    if payload.len() % 2 != 0 {
        return Err(Error::InvalidData(format!(
            "message payload has odd length {}",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode text into a message payload
pub fn encode_wire_text(text: &str) -> Bytes {
    let units: Vec<u16> = text.encode_utf16().collect();
    encode_wire_units(&units)
}

/// Decode a message payload into text
pub fn decode_wire_text(payload: &[u8]) -> Result<String> {
    let units = decode_wire_units(payload)?;
    String::from_utf16(&units)
        .map_err(|e| Error::InvalidData(format!("message payload is not valid UTF-16: {}", e)))
}
