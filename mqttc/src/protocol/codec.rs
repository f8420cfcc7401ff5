//! MQTT packet encoding/decoding utilities.
//!
//! This module provides low-level encoding and decoding functions
//! for MQTT protocol primitives.

use bytes::{BufMut, BytesMut};

use super::PacketType;
use crate::error::ProtocolError;

/// Largest value the remaining length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Parsed fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: usize,
    /// Type byte plus remaining length bytes.
    pub header_len: usize,
}

impl FixedHeader {
    /// Total packet size on the wire.
    pub fn frame_len(&self) -> usize {
        self.header_len + self.remaining_length
    }
}

/// Read a variable-length integer (remaining length encoding).
///
/// Returns `(value, bytes_consumed)`, or `None` if more bytes are needed.
/// At most 4 bytes are examined; a continuation bit on the 4th byte is an error.
pub fn read_variable_int(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;

    for (i, &byte) in buf.iter().take(4).enumerate() {
        value |= ((byte & 0x7F) as usize) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if buf.len() >= 4 {
        return Err(ProtocolError::MalformedRemainingLength);
    }
    Ok(None)
}

/// Write a variable-length integer.
///
/// Returns the number of bytes written (1 to 4).
pub fn write_variable_int(buf: &mut BytesMut, mut value: usize) -> Result<usize, ProtocolError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PacketTooLarge {
            size: value,
            max: MAX_REMAINING_LENGTH,
        });
    }

    let mut written = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;

        if value > 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);
        written += 1;

        if value == 0 {
            return Ok(written);
        }
    }
}

/// Calculate the number of bytes needed for a variable-length integer.
pub const fn variable_int_len(value: usize) -> usize {
    if value < 128 {
        1
    } else if value < 128 * 128 {
        2
    } else if value < 128 * 128 * 128 {
        3
    } else {
        4
    }
}

/// Read a 2-byte big-endian u16.
pub fn read_u16(buf: &[u8]) -> Option<u16> {
    if buf.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Read binary data as a slice (2-byte length prefix + data).
///
/// Never reads past the declared length.
pub fn read_binary(buf: &[u8]) -> Option<(&[u8], usize)> {
    let len = read_u16(buf)? as usize;

    if buf.len() < 2 + len {
        return None;
    }

    Some((&buf[2..2 + len], 2 + len))
}

/// Interpret length-prefixed bytes as UTF-8.
pub fn decode_utf8(raw: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Write binary data (2-byte length prefix + data).
pub fn write_binary(buf: &mut BytesMut, data: &[u8]) -> Result<usize, ProtocolError> {
    let len = data.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::StringTooLong(len));
    }

    buf.put_u16(len as u16);
    buf.extend_from_slice(data);
    Ok(2 + len)
}

/// Write a UTF-8 string (2-byte length prefix + data).
pub fn write_string(buf: &mut BytesMut, s: &str) -> Result<usize, ProtocolError> {
    write_binary(buf, s.as_bytes())
}

/// Encoded size of a length-prefixed string or binary field.
pub const fn string_len(len: usize) -> usize {
    2 + len
}

/// Parse a fixed header from the front of `buf`.
///
/// Returns `None` while the header itself is incomplete. Reserved flags are
/// checked here so a bad packet is rejected before its body is buffered.
pub fn read_fixed_header(buf: &[u8]) -> Result<Option<FixedHeader>, ProtocolError> {
    let Some(&first_byte) = buf.first() else {
        return Ok(None);
    };

    let packet_type = PacketType::from_u8(first_byte >> 4)?;
    let flags = first_byte & 0x0F;

    match packet_type {
        PacketType::Publish => {
            if (flags >> 1) & 0x03 == 3 {
                return Err(ProtocolError::InvalidQoS(3));
            }
        }
        other if flags != other.fixed_flags() => {
            return Err(ProtocolError::InvalidFlags {
                packet: other,
                flags,
            });
        }
        _ => {}
    }

    let Some((remaining_length, var_len)) = read_variable_int(&buf[1..])? else {
        return Ok(None);
    };

    Ok(Some(FixedHeader {
        packet_type,
        flags,
        remaining_length,
        header_len: 1 + var_len,
    }))
}

/// Write a fixed header to buffer.
pub fn write_fixed_header(
    buf: &mut BytesMut,
    packet_type: PacketType,
    flags: u8,
    remaining_length: usize,
) -> Result<usize, ProtocolError> {
    buf.put_u8(((packet_type as u8) << 4) | (flags & 0x0F));
    let var_len = write_variable_int(buf, remaining_length)?;
    Ok(1 + var_len)
}
