//! Identity cache collaborator.
//!
//! The responder reads user records and cached credentials through
//! [`IdentityCache`]; the backends populate it. Two stores are provided: an
//! in-process [`MemoryCache`] and a [`JsonFileCache`] that both processes can
//! share through one file.

mod credentials;
mod file;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use credentials::Credential;
pub use file::JsonFileCache;
pub use memory::MemoryCache;

/// Where the responder and the backends meet when neither is told otherwise.
pub const DEFAULT_CACHE_PATH: &str = "/var/lib/pam-broker/cache.json";

pub fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

/// A cached user entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
    /// Seconds since the Unix epoch of the last refresh from a provider.
    #[serde(default)]
    pub last_update: Option<i64>,
}

impl UserRecord {
    /// A record refreshed right now.
    pub fn new(name: impl Into<String>, uid: u32, gid: u32) -> Self {
        Self {
            name: name.into(),
            uid: Some(uid),
            gid: Some(gid),
            last_update: Some(chrono::Utc::now().timestamp()),
        }
    }
}

/// A record plus its credential, as kept by both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    record: UserRecord,
    #[serde(default)]
    credential: Option<Credential>,
}

#[async_trait]
pub trait IdentityCache: Send + Sync {
    /// All records stored under `name` in `domain`. Callers treat more than
    /// one as an error.
    async fn get_user(&self, domain: &str, name: &str) -> Result<Vec<UserRecord>, CacheError>;

    /// Insert or replace the record for `record.name`, keeping any credential.
    async fn store_user(&self, domain: &str, record: UserRecord) -> Result<(), CacheError>;

    /// Remember a token that was just accepted by a provider.
    async fn store_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<(), CacheError>;

    /// Compare `token` with the stored credential. `NotFound` when the user or
    /// its credential is missing.
    async fn verify_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<bool, CacheError>;

    /// Set the authoritative password of a local user.
    async fn set_password(&self, domain: &str, name: &str, token: &[u8])
        -> Result<(), CacheError>;
}
