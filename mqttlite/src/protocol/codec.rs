//! MQTT packet encoding/decoding utilities.
//!
//! This module provides low-level encoding and decoding functions
//! for MQTT protocol primitives.

use bytes::BufMut;

use crate::error::{Error, Result};

/// Largest value a 4-byte remaining length can carry.
pub const MAX_REMAINING_LENGTH: usize = 0x0FFF_FFFF;

/// Incremental remaining-length decoder.
///
/// The length prefix arrives one byte at a time from the socket before the
/// body size is known, so bytes are fed in as they are read.
#[derive(Debug, Clone, Default)]
pub struct RemainingLength {
    value: usize,
    consumed: usize,
    complete: bool,
}

impl RemainingLength {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next length byte.
    ///
    /// Fails with [`Error::MalformedLength`] if the fourth byte still has its
    /// continuation bit set, or if a byte is fed after completion.
    pub fn add_byte(&mut self, byte: u8) -> Result<()> {
        if self.complete {
            return Err(Error::MalformedLength);
        }

        self.value |= ((byte & 0x7F) as usize) << (7 * self.consumed);
        self.consumed += 1;

        if byte & 0x80 == 0 {
            self.complete = true;
        } else if self.consumed == 4 {
            return Err(Error::MalformedLength);
        }

        Ok(())
    }

    /// Whether the final (continuation-free) byte has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The decoded length, once complete.
    pub fn value(&self) -> Option<usize> {
        self.complete.then_some(self.value)
    }

    /// Number of bytes fed so far.
    pub fn bytes_consumed(&self) -> usize {
        self.consumed
    }
}

/// Read a remaining length from the start of `buf`.
///
/// Returns `(value, bytes_consumed)`, or `None` if `buf` ends mid-length.
pub fn read_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut length = RemainingLength::new();
    for &byte in buf {
        length.add_byte(byte)?;
        if let Some(value) = length.value() {
            return Ok(Some((value, length.bytes_consumed())));
        }
    }
    Ok(None)
}

/// Write a remaining length using the minimal number of bytes.
///
/// Returns the number of bytes written.
pub fn write_remaining_length<B: BufMut>(buf: &mut B, mut value: usize) -> Result<usize> {
    if value > MAX_REMAINING_LENGTH {
        return Err(Error::SizeTooLarge(value));
    }

    let mut written = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
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

/// Calculate the number of bytes needed for a remaining length.
pub const fn remaining_length_len(value: usize) -> usize {
    if value <= 0x7F {
        1
    } else if value <= 0x3FFF {
        2
    } else if value <= 0x1F_FFFF {
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

/// Write a UTF-8 string (2-byte length prefix + data).
pub fn write_string<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(Error::StringTooLong(len));
    }
    buf.put_u16(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}
