//! Binary frame layout: a varint message-type prefix followed by the raw
//! payload bytes.
//!
//! A frame is exactly one transport message — the websocket's own framing
//! provides the length, so there is no outer length prefix. The type code
//! is a LEB128 varint: seven payload bits per byte, least-significant group
//! first, high bit set on every byte except the last.

use crate::{MessageType, ProtocolError};

/// A varint never spans more than 10 bytes (ceil(64 / 7)).
const MAX_VARINT_BYTES: usize = 10;

/// Appends `value` to `buf` as a LEB128 varint.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Reads a LEB128 varint from the start of `data`.
///
/// Returns the decoded value and how many bytes it consumed.
///
/// # Errors
/// Returns [`ProtocolError::MalformedFrame`] if `data` ends before the
/// varint terminates or the varint runs past 10 bytes.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), ProtocolError> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_BYTES {
            return Err(ProtocolError::MalformedFrame);
        }
        value |= u64::from(byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::MalformedFrame)
}

/// Encodes a frame: `varint(msg_type) || payload`.
///
/// Deterministic — the same input always produces the same bytes, and the
/// output round-trips through [`decode_frame`].
pub fn encode_frame(msg_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_BYTES + payload.len());
    encode_varint(msg_type.0, &mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Splits a frame into its message type and payload.
///
/// # Errors
/// Returns [`ProtocolError::MalformedFrame`] if the type varint cannot be
/// parsed (empty or unterminated input).
pub fn decode_frame(data: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    let (raw, consumed) = decode_varint(data)?;
    Ok((MessageType(raw), &data[consumed..]))
}
