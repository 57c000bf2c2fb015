use broker_core::cache::default_cache_path;
use broker_core::config::{self as core_config, CommonConfig};
use broker_core::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::domains::{DomainInfo, ProviderKind};

#[derive(Debug, Clone, Deserialize)]
pub struct PamConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Client socket timeout. Backend calls get half of it.
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    /// Age in seconds after which a cached entry is revalidated.
    #[serde(default = "default_entry_cache_timeout")]
    pub entry_cache_timeout_secs: i64,
    /// Extra delay before answering a failed local or offline login.
    #[serde(default)]
    pub failed_login_delay_secs: u64,
    /// JSON cache shared with the backends.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default)]
    pub domains: Vec<DomainInfo>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/pam-broker/pam.sock")
}

fn default_client_timeout_ms() -> u64 {
    300_000
}

fn default_entry_cache_timeout() -> i64 {
    30
}

impl PamConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: Self = core_config::load("configuration", "PAM")?;
        config.validate()?;
        Ok(config)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms / 2)
    }

    /// Remote domains need a socket to reach their backend.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.domains.is_empty() {
            return Err(AppError::Config(anyhow::anyhow!("no domains configured")));
        }
        for domain in &self.domains {
            if let ProviderKind::Remote(_) = domain.provider_kind() {
                if domain.backend_socket.is_none() {
                    return Err(AppError::Config(anyhow::anyhow!(
                        "domain {} uses a remote provider but has no backend_socket",
                        domain.name
                    )));
                }
            }
        }
        Ok(())
    }
}
