use thiserror::Error;

use crate::bus::BusError;
use crate::cache::CacheError;
use crate::pam::PamStatus;

/// Process-level error taxonomy shared by the responder and the backends.
///
/// | AppError | PAM status |
/// |----------|------------|
/// | `Decode` | `PAM_SYSTEM_ERR` |
/// | `Config` | `PAM_SYSTEM_ERR` |
/// | `System` | `PAM_SYSTEM_ERR` |
/// | `ProviderOffline` | `PAM_AUTHINFO_UNAVAIL` |
/// | `Timeout` | `PAM_SYSTEM_ERR` |
/// | `Io` / `Bus` / `Cache` | `PAM_SYSTEM_ERR` |
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("System error: {0}")]
    System(#[from] anyhow::Error),

    #[error("Provider is offline")]
    ProviderOffline,

    #[error("Operation timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl AppError {
    /// The status a PAM client sees when a request fails with this error.
    pub fn pam_status(&self) -> PamStatus {
        match self {
            AppError::ProviderOffline => PamStatus::AuthInfoUnavail,
            AppError::Decode(_)
            | AppError::Config(_)
            | AppError::System(_)
            | AppError::Timeout
            | AppError::Io(_)
            | AppError::Bus(_)
            | AppError::Cache(_) => PamStatus::SystemErr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_maps_to_authinfo_unavail() {
        assert_eq!(
            AppError::ProviderOffline.pam_status(),
            PamStatus::AuthInfoUnavail
        );
    }

    #[test]
    fn test_everything_else_is_system_error() {
        let errors = [
            AppError::Decode("short buffer".to_string()),
            AppError::Config(anyhow::anyhow!("no domains")),
            AppError::Timeout,
            AppError::Bus(BusError::NotConnected),
        ];
        for err in errors {
            assert_eq!(err.pam_status(), PamStatus::SystemErr, "{}", err);
        }
    }
}
