pub mod registry;
pub mod static_provider;

use async_trait::async_trait;
use broker_core::bus::message::{BE_REQ_GROUP, BE_REQ_INITGROUPS, BE_REQ_USER};
use broker_core::bus::{DpErrorMajor, DpReply, PamHandlerArgs};
use broker_core::error::AppError;
use broker_core::pam::PamStatus;
use thiserror::Error;

pub use registry::ProviderRegistry;
pub use static_provider::StaticProvider;

pub const ENOENT: u32 = 2;
pub const EIO: u32 = 5;
pub const EINVAL: u32 = 22;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider is offline")]
    Offline,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// The `(err_major, err_minor, err_msg)` triple sent back over the bus.
    ///
    /// A lookup that matches nothing still succeeds: the caller re-reads the
    /// cache, finds no entry and moves on to its next domain.
    pub fn to_dp_reply(&self) -> DpReply {
        let (err_maj, err_min) = match self {
            ProviderError::Offline => (DpErrorMajor::Offline, 0),
            ProviderError::NotFound(_) => (DpErrorMajor::Ok, ENOENT),
            ProviderError::InvalidRequest(_) => (DpErrorMajor::Fatal, EINVAL),
            ProviderError::Internal(_) => (DpErrorMajor::Fatal, EIO),
        };
        DpReply {
            err_maj,
            err_min,
            err_msg: self.to_string(),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Offline => AppError::ProviderOffline,
            other => AppError::System(anyhow::anyhow!(other)),
        }
    }
}

impl From<broker_core::cache::CacheError> for ProviderError {
    fn from(err: broker_core::cache::CacheError) -> Self {
        ProviderError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    User,
    Group,
    InitGroups,
}

impl EntryType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            BE_REQ_USER => Some(EntryType::User),
            BE_REQ_GROUP => Some(EntryType::Group),
            BE_REQ_INITGROUPS => Some(EntryType::InitGroups),
            _ => None,
        }
    }
}

/// Which attributes the caller wants refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrSelector {
    Core,
    Membership,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Name(String),
    IdNumber(u32),
}

/// A validated `getAccountInfo` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequest {
    pub entry_type: EntryType,
    pub attrs: AttrSelector,
    pub filter: Filter,
}

/// The operation table a backend module implements.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn check_online(&self) -> Result<bool, ProviderError>;

    /// Refresh the matching entries in the identity cache.
    async fn get_account_info(&self, request: &AccountRequest) -> Result<(), ProviderError>;

    async fn pam_handler(&self, request: &PamHandlerArgs) -> Result<PamStatus, ProviderError>;
}
