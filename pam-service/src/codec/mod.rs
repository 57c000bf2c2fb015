//! Client wire formats.
//!
//! - `packet`: the outer `len|cmd|status|reserved` frame on the socket
//! - `request`: PAM request bodies, protocol versions 1 and 2
//! - `reply`: the `status|count|items` reply body

mod cursor;
pub mod packet;
pub mod reply;
pub mod request;

use thiserror::Error;

pub use cursor::Cursor;
pub use packet::{ClientPacket, PacketCodec};
pub use reply::{decode_reply, encode_reply};
pub use request::{decode_request, AuthTok, PamRequest};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Buffer truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Missing or misplaced request marker")]
    BadMarker,

    #[error("String at offset {0} is not NUL terminated")]
    MissingNul(usize),

    #[error("String at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("Request carries no user name")]
    MissingUser,

    #[error("Invalid token size {0}")]
    BadTokenSize(u32),

    #[error("Invalid user name {0:?}")]
    BadName(String),

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),
}
