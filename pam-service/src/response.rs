//! Ordered response items returned to the PAM client.

use bytes::Bytes;

pub const PAM_USER_INFO: i32 = 0x01;
pub const PAM_DOMAIN_NAME: i32 = 0x02;
pub const PAM_ENV_ITEM: i32 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseItem {
    pub kind: i32,
    pub data: Bytes,
}

/// Append-only, insertion-ordered list of response items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseList {
    items: Vec<ResponseItem>,
}

impl ResponseList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: i32, data: impl Into<Bytes>) {
        self.items.push(ResponseItem {
            kind,
            data: data.into(),
        });
    }

    /// Append `value` followed by a NUL byte.
    pub fn append_cstr(&mut self, kind: i32, value: &str) {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.append(kind, data);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseItem> {
        self.items.iter()
    }

    /// Sum of all payload lengths.
    pub fn payload_len(&self) -> usize {
        self.items.iter().map(|item| item.data.len()).sum()
    }
}

impl FromIterator<ResponseItem> for ResponseList {
    fn from_iter<T: IntoIterator<Item = ResponseItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
