use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

pub const HEADER_LEN: usize = 16;
pub const MAX_PACKET_LEN: usize = 4096;

pub const SSS_GET_VERSION: u32 = 0x0001;

/// One client packet: `len|cmd|status|reserved` then the body. `len` counts
/// the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPacket {
    pub cmd: u32,
    pub status: u32,
    pub body: Bytes,
}

impl ClientPacket {
    pub fn new(cmd: u32, body: impl Into<Bytes>) -> Self {
        Self {
            cmd,
            status: 0,
            body: body.into(),
        }
    }

    pub fn with_status(cmd: u32, status: u32) -> Self {
        Self {
            cmd,
            status,
            body: Bytes::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = ClientPacket;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if !(HEADER_LEN..=MAX_PACKET_LEN).contains(&len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid packet length {}", len),
            ));
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut packet = src.split_to(len);
        packet.advance(4);
        let cmd = packet.get_u32_le();
        let status = packet.get_u32_le();
        let _reserved = packet.get_u32_le();
        Ok(Some(ClientPacket {
            cmd,
            status,
            body: packet.freeze(),
        }))
    }
}

impl Encoder<ClientPacket> for PacketCodec {
    type Error = io::Error;

    fn encode(&mut self, packet: ClientPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = HEADER_LEN + packet.body.len();
        if len > MAX_PACKET_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("reply of {} bytes exceeds packet limit", len),
            ));
        }
        dst.reserve(len);
        dst.put_u32_le(len as u32);
        dst.put_u32_le(packet.cmd);
        dst.put_u32_le(packet.status);
        dst.put_u32_le(0);
        dst.put_slice(&packet.body);
        Ok(())
    }
}
