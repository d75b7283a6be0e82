//! Message framing: `[0x00][varint length][varint type][payload]`.

use bytes::{Buf, BytesMut};

use crate::error::Error;
use crate::proto::varint::{decode_varint, encode_varint};

/// Encode a complete frame for `message_type` carrying `payload`.
pub fn encode_frame(message_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.push(0x00);
    encode_varint(payload.len() as u64, &mut out);
    encode_varint(u64::from(message_type), &mut out);
    out.extend_from_slice(payload);
    out
}

/// Incremental frame decoder over a byte stream, used on both sides of
/// a TCP connection. Bytes are appended as they arrive and `decode`
/// is called until it returns `None`, mirroring a
/// `tokio_util::codec::Decoder`.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode one frame from the buffered bytes.
    ///
    /// Returns `Ok(None)` if the buffer holds an incomplete frame (the
    /// caller should read more bytes and retry); consumes the frame's
    /// bytes on success. A `MalformedFrame` error means the caller
    /// must close the connection.
    pub fn decode(&mut self) -> Result<Option<(u32, BytesMut)>, Error> {
        parse_one(&mut self.buffer)
    }
}

/// Try to pull one complete frame off the front of `buffer`, used both
/// by [`FrameDecoder`] and by the `tokio_util::codec::Decoder`
/// implementation in `server`, which is handed a `BytesMut` directly
/// by `Framed` instead of managing its own.
pub(crate) fn parse_one(buffer: &mut BytesMut) -> Result<Option<(u32, BytesMut)>, Error> {
    if buffer.is_empty() {
        return Ok(None);
    }
    if buffer[0] != 0x00 {
        return Err(Error::MalformedFrame(format!(
            "expected frame marker 0x00, got {:#04x}",
            buffer[0]
        )));
    }

    let rest = &buffer[1..];
    let Some((payload_len, len_size)) = decode_varint(rest)? else {
        return Ok(None);
    };
    let rest = &rest[len_size..];
    let Some((message_type, type_size)) = decode_varint(rest)? else {
        return Ok(None);
    };

    let header_size = 1 + len_size + type_size;
    let total_size = header_size + payload_len as usize;
    if buffer.len() < total_size {
        return Ok(None);
    }

    let mut frame = buffer.split_to(total_size);
    frame.advance(header_size);
    Ok(Some((message_type as u32, frame)))
}
