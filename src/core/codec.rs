use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{parse_header, Packet, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Frames [`Packet`]s over a byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let Some((type_id, len)) = parse_header(src)? else {
            return Ok(None);
        };

        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len);

        Ok(Some(Packet {
            type_id,
            payload: payload.to_vec(),
        }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > crate::config::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }

        dst.reserve(item.encoded_len());
        dst.put_u16(item.type_id);
        dst.put_u32(item.payload.len() as u32);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
