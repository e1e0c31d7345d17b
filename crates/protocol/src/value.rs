//! Tagged value codec
//!
//! Every field the simulator exchanges is big-endian. Typed fields inside
//! compounds and result blocks are preceded by a one-byte [`ValueType`] tag.
//!
//! Wire representations:
//! ```text
//! byte        │ u8
//! int32       │ i32 (BE)
//! float64     │ f64 (BE, IEEE 754)
//! string      │ i32 byte_len │ bytes
//! string list │ i32 count    │ string*
//! compound    │ 0x0F │ i32 count │ (tag value)*
//! ```
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use traclink_protocol::value::{self, Reader};
//!
//! let mut buf = BytesMut::new();
//! value::encode_int32(&mut buf, 1);
//! value::encode_string(&mut buf, "veh0").unwrap();
//!
//! let mut reader = Reader::new(&buf);
//! assert_eq!(reader.decode_int32().unwrap(), 1);
//! assert_eq!(reader.decode_string().unwrap(), "veh0");
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// Type tags preceding typed values on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Geographic position: two float64 (lon, lat)
    PositionLonLat = 0x00,
    /// Cartesian position: two float64 (x, y)
    Position2D = 0x01,
    UByte = 0x07,
    Byte = 0x08,
    Int = 0x09,
    Double = 0x0B,
    String = 0x0C,
    StringList = 0x0E,
    Compound = 0x0F,
}

impl ValueType {
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::PositionLonLat),
            0x01 => Some(Self::Position2D),
            0x07 => Some(Self::UByte),
            0x08 => Some(Self::Byte),
            0x09 => Some(Self::Int),
            0x0B => Some(Self::Double),
            0x0C => Some(Self::String),
            0x0E => Some(Self::StringList),
            0x0F => Some(Self::Compound),
            _ => None,
        }
    }
}

fn wire_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| ProtocolError::invalid(format!("{what} length {len} exceeds i32::MAX")))
}

#[inline]
pub fn encode_tag(buf: &mut BytesMut, value_type: ValueType) {
    buf.put_u8(value_type.tag());
}

#[inline]
pub fn encode_byte(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

/// Writes an int32 in network byte order
#[inline]
pub fn encode_int32(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

/// Writes a float64 in network byte order
#[inline]
pub fn encode_float64(buf: &mut BytesMut, value: f64) {
    buf.put_f64(value);
}

/// Writes `i32 byte_len || bytes` (no terminator)
pub fn encode_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = wire_len(value.len(), "string")?;
    buf.reserve(4 + value.len());
    buf.put_i32(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Writes `i32 count || string*`
pub fn encode_string_list<S: AsRef<str>>(buf: &mut BytesMut, items: &[S]) -> Result<()> {
    buf.put_i32(wire_len(items.len(), "string list")?);
    for item in items {
        encode_string(buf, item.as_ref())?;
    }
    Ok(())
}

/// Writes the compound tag and element count; the caller appends the tagged elements
pub fn encode_compound_header(buf: &mut BytesMut, count: usize) -> Result<()> {
    encode_tag(buf, ValueType::Compound);
    buf.put_i32(wire_len(count, "compound")?);
    Ok(())
}

pub fn encode_tagged_byte(buf: &mut BytesMut, value: u8) {
    encode_tag(buf, ValueType::Byte);
    encode_byte(buf, value);
}

pub fn encode_tagged_ubyte(buf: &mut BytesMut, value: u8) {
    encode_tag(buf, ValueType::UByte);
    encode_byte(buf, value);
}

pub fn encode_tagged_int32(buf: &mut BytesMut, value: i32) {
    encode_tag(buf, ValueType::Int);
    encode_int32(buf, value);
}

pub fn encode_tagged_float64(buf: &mut BytesMut, value: f64) {
    encode_tag(buf, ValueType::Double);
    encode_float64(buf, value);
}

pub fn encode_tagged_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    encode_tag(buf, ValueType::String);
    encode_string(buf, value)
}

pub fn encode_tagged_string_list<S: AsRef<str>>(buf: &mut BytesMut, items: &[S]) -> Result<()> {
    encode_tag(buf, ValueType::StringList);
    encode_string_list(buf, items)
}

/// Cursor over a received byte buffer
///
/// Every `decode_*` call advances the cursor. Reading past the end yields
/// [`ProtocolError::TruncatedResponse`] and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Creates a reader positioned at `offset`
    pub fn at(buf: &'a [u8], offset: usize) -> Result<Self> {
        if offset > buf.len() {
            return Err(ProtocolError::TruncatedResponse {
                need: offset,
                have: buf.len(),
            });
        }
        Ok(Self { buf, pos: offset })
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::TruncatedResponse {
                need: self.pos + n,
                have: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Borrows the next `n` raw bytes
    pub fn decode_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn decode_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn decode_int32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn decode_float64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    fn decode_len(&mut self) -> Result<usize> {
        let len = self.decode_int32()?;
        usize::try_from(len).map_err(|_| ProtocolError::FrameLength(len.into()))
    }

    pub fn decode_string(&mut self) -> Result<String> {
        let len = self.decode_len()?;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn decode_string_list(&mut self) -> Result<Vec<String>> {
        let count = self.decode_len()?;
        // Every element needs at least its 4-byte length prefix
        if count > self.remaining() / 4 {
            return Err(ProtocolError::TruncatedResponse {
                need: self.pos + count * 4,
                have: self.buf.len(),
            });
        }
        (0..count).map(|_| self.decode_string()).collect()
    }

    /// Reads a type tag without validating it
    pub fn decode_tag(&mut self) -> Result<u8> {
        self.decode_byte()
    }

    /// Reads a type tag and fails unless it equals `expected`
    pub fn expect_tag(&mut self, expected: ValueType) -> Result<()> {
        let found = self.decode_tag()?;
        if found != expected.tag() {
            return Err(ProtocolError::mismatch("value type", expected.tag(), found));
        }
        Ok(())
    }

    /// Reads the compound tag and element count
    pub fn decode_compound_header(&mut self) -> Result<usize> {
        self.expect_tag(ValueType::Compound)?;
        self.decode_len()
    }

    /// Reads a compound header and fails unless it holds exactly `count` elements
    pub fn expect_compound(&mut self, count: usize) -> Result<()> {
        let found = self.decode_compound_header()?;
        if found != count {
            return Err(ProtocolError::invalid(format!(
                "compound holds {found} elements, expected {count}"
            )));
        }
        Ok(())
    }

    pub fn decode_tagged_byte(&mut self) -> Result<u8> {
        self.expect_tag(ValueType::Byte)?;
        self.decode_byte()
    }

    pub fn decode_tagged_ubyte(&mut self) -> Result<u8> {
        self.expect_tag(ValueType::UByte)?;
        self.decode_byte()
    }

    pub fn decode_tagged_int32(&mut self) -> Result<i32> {
        self.expect_tag(ValueType::Int)?;
        self.decode_int32()
    }

    pub fn decode_tagged_float64(&mut self) -> Result<f64> {
        self.expect_tag(ValueType::Double)?;
        self.decode_float64()
    }

    pub fn decode_tagged_string(&mut self) -> Result<String> {
        self.expect_tag(ValueType::String)?;
        self.decode_string()
    }

    pub fn decode_tagged_string_list(&mut self) -> Result<Vec<String>> {
        self.expect_tag(ValueType::StringList)?;
        self.decode_string_list()
    }
}
