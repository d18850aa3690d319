use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};

/// Size of the frame header: 2-byte type id + 4-byte payload length.
pub const HEADER_SIZE: usize = 6;

/// A single control-channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub type_id: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Total encoded length including the header.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize into a standalone buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.type_id.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a frame from a buffer that holds at least one complete frame.
    ///
    /// Trailing bytes after the frame are ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (type_id, len) = parse_header(buf)?.ok_or(ProtocolError::InvalidHeader)?;

        let end = HEADER_SIZE + len;
        if buf.len() < end {
            return Err(ProtocolError::InvalidHeader);
        }

        Ok(Self {
            type_id,
            payload: buf[HEADER_SIZE..end].to_vec(),
        })
    }
}

/// Read the header fields if enough bytes are available.
///
/// Returns `Ok(None)` for a short buffer and rejects lengths above
/// `MAX_PAYLOAD_SIZE` before anything is allocated.
pub(crate) fn parse_header(buf: &[u8]) -> Result<Option<(u16, usize)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let type_id = u16::from_be_bytes([buf[0], buf[1]]);
    let len = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;

    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(len));
    }

    Ok(Some((type_id, len)))
}
