use broker_core::pam::PamStatus;
use bytes::{BufMut, Bytes, BytesMut};

use super::cursor::Cursor;
use super::DecodeError;
use crate::response::{ResponseItem, ResponseList};

/// `status:i32 count:i32 {type:i32 len:i32 bytes}*`, little-endian, items in
/// insertion order.
pub fn encode_reply(status: PamStatus, responses: &ResponseList) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + responses.len() * 8 + responses.payload_len());
    buf.put_i32_le(status.code());
    buf.put_i32_le(responses.len() as i32);
    for item in responses.iter() {
        buf.put_i32_le(item.kind);
        buf.put_i32_le(item.data.len() as i32);
        buf.put_slice(&item.data);
    }
    buf.freeze()
}

/// Client-side inverse of [`encode_reply`].
pub fn decode_reply(body: &Bytes) -> Result<(PamStatus, ResponseList), DecodeError> {
    let mut cursor = Cursor::new(body);
    let status = PamStatus::from(cursor.read_u32()? as i32);
    let count = cursor.read_u32()?;

    let mut items = Vec::new();
    for _ in 0..count {
        let kind = cursor.read_u32()? as i32;
        let len = cursor.read_u32()?;
        let data = cursor.read_length_prefixed(len as usize)?;
        items.push(ResponseItem { kind, data });
    }
    Ok((status, items.into_iter().collect()))
}
