//! PAM request bodies.
//!
//! Version 1 is a run of NUL-terminated strings followed by two
//! `type|size|bytes` tokens. Version 2 is a START marker, tagged records and
//! an END record:
//!
//! ```text
//! START {tag payload}* END
//!   string tags:  len:u32 bytes (last byte NUL)
//!   token tags:   total:u32 subtype:u32 bytes[total - 4]
//!   unknown tags: len:u32 bytes (skipped)
//! ```
//!
//! All integers are little-endian.

use broker_core::pam::AuthTokType;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use super::cursor::Cursor;
use super::DecodeError;
use crate::names::NameParser;

pub const PROTOCOL_V1: u32 = 1;
pub const PROTOCOL_V2: u32 = 2;

pub const START_OF_PAM_REQUEST: u32 = 0x4d41_5049;
pub const END_OF_PAM_REQUEST: u32 = 0x4950_414d;

pub const PAM_ITEM_USER: u32 = 1;
pub const PAM_ITEM_SERVICE: u32 = 2;
pub const PAM_ITEM_TTY: u32 = 3;
pub const PAM_ITEM_RUSER: u32 = 4;
pub const PAM_ITEM_RHOST: u32 = 5;
pub const PAM_ITEM_AUTHTOK: u32 = 6;
pub const PAM_ITEM_NEWAUTHTOK: u32 = 7;

const V2_MIN_LEN: usize = 4 * 4 + 2;

/// An authentication token. The bytes are a slice of the request buffer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthTok {
    pub kind: AuthTokType,
    pub data: Bytes,
}

impl AuthTok {
    pub fn password(data: impl Into<Bytes>) -> Self {
        Self {
            kind: AuthTokType::Password,
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for AuthTok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTok")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .finish()
    }
}

/// The decoded fields of a client request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PamRequest {
    pub domain: Option<String>,
    pub user: String,
    pub service: String,
    pub tty: String,
    pub ruser: String,
    pub rhost: String,
    pub authtok: AuthTok,
    pub newauthtok: AuthTok,
}

/// Decode `body` with the negotiated protocol `version`.
pub fn decode_request(
    version: u32,
    body: &Bytes,
    names: &NameParser,
) -> Result<PamRequest, DecodeError> {
    if body.len() >= 4 && trailing_u32(body) != END_OF_PAM_REQUEST {
        return Err(DecodeError::BadMarker);
    }

    match version {
        PROTOCOL_V1 => decode_v1(body, names),
        PROTOCOL_V2 => decode_v2(body, names),
        other => Err(DecodeError::UnsupportedVersion(other)),
    }
}

fn trailing_u32(body: &Bytes) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&body[body.len() - 4..]);
    u32::from_le_bytes(raw)
}

/// Version 1. Bytes after the new token are ignored.
pub fn decode_v1(body: &Bytes, names: &NameParser) -> Result<PamRequest, DecodeError> {
    let mut cursor = Cursor::new(body);

    let qualified = cursor.read_cstring()?;
    let (user, domain) = names.parse(&qualified)?;

    let service = cursor.read_cstring()?;
    let tty = cursor.read_cstring()?;
    let ruser = cursor.read_cstring()?;
    let rhost = cursor.read_cstring()?;
    let authtok = read_v1_token(&mut cursor)?;
    let newauthtok = read_v1_token(&mut cursor)?;

    Ok(PamRequest {
        domain,
        user,
        service,
        tty,
        ruser,
        rhost,
        authtok,
        newauthtok,
    })
}

fn read_v1_token(cursor: &mut Cursor<'_>) -> Result<AuthTok, DecodeError> {
    let kind = AuthTokType::from(cursor.read_u32()?);
    let size = cursor.read_u32()?;
    let data = cursor.read_length_prefixed(size as usize)?;
    Ok(AuthTok { kind, data })
}

/// Version 2.
pub fn decode_v2(body: &Bytes, names: &NameParser) -> Result<PamRequest, DecodeError> {
    if body.len() < V2_MIN_LEN {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: V2_MIN_LEN,
        });
    }

    let mut cursor = Cursor::new(body);
    if cursor.read_u32()? != START_OF_PAM_REQUEST || trailing_u32(body) != END_OF_PAM_REQUEST {
        return Err(DecodeError::BadMarker);
    }

    let mut request = PamRequest::default();
    while !cursor.is_empty() {
        let tag = cursor.read_u32()?;
        match tag {
            PAM_ITEM_USER => {
                let qualified = read_string_record(&mut cursor)?;
                let (user, domain) = names.parse(&qualified)?;
                request.user = user;
                request.domain = domain;
            }
            PAM_ITEM_SERVICE => request.service = read_string_record(&mut cursor)?,
            PAM_ITEM_TTY => request.tty = read_string_record(&mut cursor)?,
            PAM_ITEM_RUSER => request.ruser = read_string_record(&mut cursor)?,
            PAM_ITEM_RHOST => request.rhost = read_string_record(&mut cursor)?,
            PAM_ITEM_AUTHTOK => request.authtok = read_token_record(&mut cursor)?,
            PAM_ITEM_NEWAUTHTOK => request.newauthtok = read_token_record(&mut cursor)?,
            END_OF_PAM_REQUEST => {
                if !cursor.is_empty() {
                    return Err(DecodeError::BadMarker);
                }
            }
            unknown => {
                let len = cursor.read_u32()?;
                tracing::debug!(tag = unknown, len, "Skipping unknown request item");
                cursor.skip(len as usize)?;
            }
        }
    }

    if request.user.is_empty() {
        return Err(DecodeError::MissingUser);
    }
    Ok(request)
}

fn read_string_record(cursor: &mut Cursor<'_>) -> Result<String, DecodeError> {
    let len = cursor.read_u32()?;
    cursor.read_fixed_string(len as usize)
}

fn read_token_record(cursor: &mut Cursor<'_>) -> Result<AuthTok, DecodeError> {
    let total = cursor.read_u32()?;
    if total < 4 {
        return Err(DecodeError::BadTokenSize(total));
    }
    // The subtype and the data must both fit before anything is consumed.
    if cursor.remaining() < total as usize {
        return Err(DecodeError::Truncated {
            offset: cursor.position(),
            needed: total as usize,
        });
    }
    let kind = AuthTokType::from(cursor.read_u32()?);
    let data = cursor.read_length_prefixed(total as usize - 4)?;
    Ok(AuthTok { kind, data })
}

/// Encode a request as a version 1 body, END marker included.
pub fn encode_v1(request: &PamRequest, names: &NameParser) -> Bytes {
    let mut buf = BytesMut::new();
    let qualified = names.qualify(&request.user, request.domain.as_deref());
    for value in [
        qualified.as_str(),
        &request.service,
        &request.tty,
        &request.ruser,
        &request.rhost,
    ] {
        buf.put_slice(value.as_bytes());
        buf.put_u8(0);
    }
    for tok in [&request.authtok, &request.newauthtok] {
        buf.put_u32_le(tok.kind.into());
        buf.put_u32_le(tok.data.len() as u32);
        buf.put_slice(&tok.data);
    }
    buf.put_u32_le(END_OF_PAM_REQUEST);
    buf.freeze()
}

/// Encode a request as a version 2 body. Empty optional strings are omitted.
pub fn encode_v2(request: &PamRequest, names: &NameParser) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32_le(START_OF_PAM_REQUEST);

    let qualified = names.qualify(&request.user, request.domain.as_deref());
    put_string_record(&mut buf, PAM_ITEM_USER, &qualified);
    for (tag, value) in [
        (PAM_ITEM_SERVICE, &request.service),
        (PAM_ITEM_TTY, &request.tty),
        (PAM_ITEM_RUSER, &request.ruser),
        (PAM_ITEM_RHOST, &request.rhost),
    ] {
        if !value.is_empty() {
            put_string_record(&mut buf, tag, value);
        }
    }
    for (tag, tok) in [
        (PAM_ITEM_AUTHTOK, &request.authtok),
        (PAM_ITEM_NEWAUTHTOK, &request.newauthtok),
    ] {
        if tok.kind != AuthTokType::Empty || !tok.data.is_empty() {
            buf.put_u32_le(tag);
            buf.put_u32_le(tok.data.len() as u32 + 4);
            buf.put_u32_le(tok.kind.into());
            buf.put_slice(&tok.data);
        }
    }

    buf.put_u32_le(END_OF_PAM_REQUEST);
    buf.freeze()
}

fn put_string_record(buf: &mut BytesMut, tag: u32, value: &str) {
    buf.put_u32_le(tag);
    buf.put_u32_le(value.len() as u32 + 1);
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PamRequest {
        PamRequest {
            domain: Some("EXAMPLE".to_string()),
            user: "alice".to_string(),
            service: "sshd".to_string(),
            tty: "pts/0".to_string(),
            ruser: "root".to_string(),
            rhost: "10.0.0.1".to_string(),
            authtok: AuthTok::password(&b"secret"[..]),
            newauthtok: AuthTok::default(),
        }
    }

    #[test]
    fn test_v2_round_trip() {
        let names = NameParser::default();
        let request = sample();
        let body = encode_v2(&request, &names);
        assert_eq!(decode_request(PROTOCOL_V2, &body, &names).unwrap(), request);
    }

    #[test]
    fn test_v1_and_v2_agree() {
        let names = NameParser::default();
        let request = sample();
        let v1 = decode_request(PROTOCOL_V1, &encode_v1(&request, &names), &names).unwrap();
        let v2 = decode_request(PROTOCOL_V2, &encode_v2(&request, &names), &names).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.domain.as_deref(), Some("EXAMPLE"));
        assert_eq!(v1.authtok.data.as_ref(), b"secret");
    }

    #[test]
    fn test_every_v2_truncation_is_rejected() {
        let names = NameParser::default();
        let body = encode_v2(&sample(), &names);
        for cut in 0..body.len() {
            let truncated = body.slice(..cut);
            assert!(
                decode_v2(&truncated, &names).is_err(),
                "truncation at {} decoded",
                cut
            );
        }
    }

    #[test]
    fn test_v2_string_without_nul_is_rejected() {
        let names = NameParser::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(START_OF_PAM_REQUEST);
        buf.put_u32_le(PAM_ITEM_USER);
        buf.put_u32_le(5);
        buf.put_slice(b"alice");
        buf.put_u32_le(END_OF_PAM_REQUEST);
        let body = buf.freeze();

        assert!(matches!(
            decode_v2(&body, &names),
            Err(DecodeError::MissingNul(_))
        ));
    }

    #[test]
    fn test_v2_unknown_tag_is_skipped() {
        let names = NameParser::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(START_OF_PAM_REQUEST);
        buf.put_u32_le(0x99);
        buf.put_u32_le(3);
        buf.put_slice(b"xyz");
        put_string_record(&mut buf, PAM_ITEM_USER, "bob");
        buf.put_u32_le(END_OF_PAM_REQUEST);
        let body = buf.freeze();

        let request = decode_v2(&body, &names).unwrap();
        assert_eq!(request.user, "bob");
        assert_eq!(request.domain, None);
    }

    #[test]
    fn test_v2_without_user_is_rejected() {
        let names = NameParser::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(START_OF_PAM_REQUEST);
        put_string_record(&mut buf, PAM_ITEM_SERVICE, "login");
        buf.put_u32_le(END_OF_PAM_REQUEST);
        let body = buf.freeze();

        assert_eq!(decode_v2(&body, &names), Err(DecodeError::MissingUser));
    }

    #[test]
    fn test_v2_token_smaller_than_subtype_is_rejected() {
        let names = NameParser::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(START_OF_PAM_REQUEST);
        put_string_record(&mut buf, PAM_ITEM_USER, "bob");
        buf.put_u32_le(PAM_ITEM_AUTHTOK);
        buf.put_u32_le(2);
        buf.put_u32_le(0);
        buf.put_u32_le(END_OF_PAM_REQUEST);
        let body = buf.freeze();

        assert_eq!(decode_v2(&body, &names), Err(DecodeError::BadTokenSize(2)));
    }

    #[test]
    fn test_missing_end_marker_is_rejected_for_both_versions() {
        let names = NameParser::default();
        let body = encode_v1(&sample(), &names);
        let unterminated = body.slice(..body.len() - 1);
        for version in [PROTOCOL_V1, PROTOCOL_V2] {
            assert_eq!(
                decode_request(version, &unterminated, &names),
                Err(DecodeError::BadMarker)
            );
        }
    }

    #[test]
    fn test_v1_oversized_token_is_rejected() {
        let names = NameParser::default();
        let mut buf = BytesMut::new();
        buf.put_slice(b"alice\0login\0\0\0\0");
        buf.put_u32_le(1);
        buf.put_u32_le(64);
        buf.put_slice(b"short");
        buf.put_u32_le(END_OF_PAM_REQUEST);
        let body = buf.freeze();

        assert!(matches!(
            decode_request(PROTOCOL_V1, &body, &names),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let names = NameParser::default();
        let body = encode_v2(&sample(), &names);
        assert_eq!(
            decode_request(3, &body, &names),
            Err(DecodeError::UnsupportedVersion(3))
        );
    }

    #[test]
    fn test_token_debug_hides_bytes() {
        let rendered = format!("{:?}", sample().authtok);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("len: 6"));
    }
}
