use broker_core::bus::{BusError, DpErrorMajor};
use broker_core::cache::CacheError;
use broker_core::pam::PamStatus;
use thiserror::Error;

use crate::codec::DecodeError;

/// Request-level failures inside the responder.
///
/// | PamError | PAM status |
/// |----------|------------|
/// | `UserUnknown` / `DomainNotFound` | `PAM_USER_UNKNOWN` |
/// | everything else | `PAM_SYSTEM_ERR` |
#[derive(Debug, Error)]
pub enum PamError {
    #[error("Malformed request: {0}")]
    Decode(#[from] DecodeError),

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Domain {0} has no auth provider")]
    NoProvider(String),

    #[error("User unknown: {0}")]
    UserUnknown(String),

    #[error("Cache returned {count} entries for {user}")]
    MultipleMatches { user: String, count: usize },

    #[error("No {field} for user {user}")]
    MissingId { user: String, field: &'static str },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Backend error {major:?}/{minor}: {message}")]
    Backend {
        major: DpErrorMajor,
        minor: u32,
        message: String,
    },

    #[error("Unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

impl PamError {
    pub fn status(&self) -> PamStatus {
        match self {
            PamError::UserUnknown(_) | PamError::DomainNotFound(_) => PamStatus::UserUnknown,
            _ => PamStatus::SystemErr,
        }
    }
}
