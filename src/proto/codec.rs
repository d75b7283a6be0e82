//! `tokio_util::codec` adapter over the frame format, so a connection
//! can be driven as a `Framed<TcpStream, WireCodec>` sink/stream pair
//! instead of a hand-rolled read loop.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::proto::frame::parse_one;
use crate::proto::varint::encode_varint;

#[derive(Default)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = (u32, BytesMut);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        parse_one(src)
    }
}

impl Encoder<(u32, Vec<u8>)> for WireCodec {
    type Error = Error;

    fn encode(&mut self, item: (u32, Vec<u8>), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (message_type, payload) = item;
        dst.put_u8(0x00);
        let mut header = Vec::with_capacity(8);
        encode_varint(payload.len() as u64, &mut header);
        encode_varint(u64::from(message_type), &mut header);
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::frame::encode_frame;

    #[test]
    fn encode_matches_encode_frame() {
        let mut codec = WireCodec;
        let mut dst = BytesMut::new();
        codec.encode((7, b"hello".to_vec()), &mut dst).unwrap();
        assert_eq!(&dst[..], &encode_frame(7, b"hello")[..]);
    }

    #[test]
    fn decode_then_encode_roundtrip() {
        let mut codec = WireCodec;
        let mut buf = BytesMut::from(&encode_frame(3, b"payload")[..]);
        let (ty, payload) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(ty, 3);
        assert_eq!(&payload[..], b"payload");
    }
}
