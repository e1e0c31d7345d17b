//! Packet framing
//!
//! Every message on the socket is a 4-byte total length followed by one or
//! more blocks. A block carries its content length, `body + 2`, in either
//! header form.
//!
//! Wire format (big-endian):
//! ```text
//! packet         │ u32 total_len │ block+
//! short block    │ u8 len        │ u8 id │ body      (len = body + 2, at most 254)
//! extended block │ 0x00 │ i32 len │ u8 id │ body      (len = body + 2, from 255)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::value::Reader;

/// Size of the total-length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest block length the one-byte header can express
pub const MAX_SHORT_BLOCK_LEN: usize = 254;

/// Bytes the length field counts besides the body
const CONTENT_OVERHEAD: usize = 2;
const EXTENDED_HEADER_LEN: usize = 6;

/// Appends one block (`header || id || body`) to `buf`
pub fn encode_block(buf: &mut BytesMut, id: u8, body: &[u8]) {
    let content_len = body.len() + CONTENT_OVERHEAD;
    if content_len <= MAX_SHORT_BLOCK_LEN {
        buf.reserve(content_len);
        buf.put_u8(content_len as u8);
    } else {
        buf.reserve(body.len() + EXTENDED_HEADER_LEN);
        buf.put_u8(0);
        buf.put_u32(content_len as u32);
    }
    buf.put_u8(id);
    buf.put_slice(body);
}

/// Reads one block, returning its id and body
pub fn decode_block<'a>(reader: &mut Reader<'a>) -> Result<(u8, &'a [u8])> {
    let content_len = match reader.decode_byte()? {
        0 => {
            let len = reader.decode_int32()?;
            usize::try_from(len).map_err(|_| ProtocolError::FrameLength(len.into()))?
        }
        len => len as usize,
    };

    if content_len < CONTENT_OVERHEAD {
        return Err(ProtocolError::FrameLength(content_len as i64));
    }

    let id = reader.decode_byte()?;
    let body = reader.decode_bytes(content_len - CONTENT_OVERHEAD)?;
    Ok((id, body))
}

/// Prepends the total-length prefix to already encoded blocks
pub fn with_length_prefix(blocks: &[u8]) -> Bytes {
    let total = blocks.len() + LENGTH_PREFIX_LEN;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32(total as u32);
    buf.put_slice(blocks);
    buf.freeze()
}

/// Validates a raw total-length prefix and returns the full packet length
pub fn decode_length_prefix(prefix: [u8; LENGTH_PREFIX_LEN]) -> Result<usize> {
    checked_total(i32::from_be_bytes(prefix))
}

/// Reads and validates the total-length prefix at the reader's position
pub fn read_length_prefix(reader: &mut Reader<'_>) -> Result<usize> {
    checked_total(reader.decode_int32()?)
}

fn checked_total(total: i32) -> Result<usize> {
    match usize::try_from(total) {
        Ok(total) if total >= LENGTH_PREFIX_LEN => Ok(total),
        _ => Err(ProtocolError::FrameLength(total.into())),
    }
}

/// Wraps a command payload into a complete packet
pub fn frame(command_id: u8, payload: &[u8]) -> Bytes {
    let mut block = BytesMut::with_capacity(payload.len() + EXTENDED_HEADER_LEN);
    encode_block(&mut block, command_id, payload);
    with_length_prefix(&block)
}

/// Splits a single-command packet into its command id and payload
pub fn unframe(packet: &[u8]) -> Result<(u8, &[u8])> {
    let mut reader = Reader::new(packet);
    let total = read_length_prefix(&mut reader)?;

    if total > packet.len() {
        return Err(ProtocolError::TruncatedResponse {
            need: total,
            have: packet.len(),
        });
    }
    if total < packet.len() {
        return Err(ProtocolError::FrameLength(total as i64));
    }

    let (id, payload) = decode_block(&mut reader)?;
    if !reader.is_empty() {
        return Err(ProtocolError::invalid(format!(
            "{} bytes after command block",
            reader.remaining()
        )));
    }

    Ok((id, payload))
}
