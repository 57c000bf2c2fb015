use broker_core::cache::default_cache_path;
use broker_core::config::{self as core_config, CommonConfig};
use broker_core::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    /// Registry name of the provider to load.
    #[serde(default = "default_provider")]
    pub provider: String,
    pub domain: String,
    /// Socket the responder links to.
    pub socket_path: PathBuf,
    /// Optional socket for the monitor interface.
    #[serde(default)]
    pub monitor_socket: Option<PathBuf>,
    /// JSON cache shared with the responder.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default)]
    pub static_provider: StaticProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticProviderConfig {
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub users: Vec<StaticUser>,
}

impl Default for StaticProviderConfig {
    fn default() -> Self {
        Self {
            online: default_online(),
            users: Vec::new(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct StaticUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub password: String,
}

impl std::fmt::Debug for StaticUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticUser")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .finish_non_exhaustive()
    }
}

fn default_provider() -> String {
    "static".to_string()
}

fn default_online() -> bool {
    true
}

impl ProviderConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: Self = core_config::load("configuration", "PROVIDER")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.domain.trim().is_empty() {
            return Err(AppError::Config(anyhow::anyhow!("domain must not be empty")));
        }
        if self.monitor_socket.as_ref() == Some(&self.socket_path) {
            return Err(AppError::Config(anyhow::anyhow!(
                "monitor_socket must differ from socket_path"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_static_users() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("provider.toml")).unwrap();
        writeln!(
            file,
            r#"
domain = "CORP"
socket_path = "/tmp/corp.sock"

[static_provider]
online = false

[[static_provider.users]]
name = "alice"
uid = 1000
gid = 1000
password = "secret"
"#
        )
        .unwrap();

        let stem = dir.path().join("provider");
        let config: ProviderConfig =
            core_config::load(stem.to_str().unwrap(), "PROVIDER_SERVICE_CONFIG_TEST").unwrap();
        config.validate().unwrap();

        assert_eq!(config.provider, "static");
        // Same default as the responder, so both sides see one cache.
        assert_eq!(config.cache_path, default_cache_path());
        assert!(!config.static_provider.online);
        assert_eq!(config.static_provider.users[0].uid, 1000);
        assert!(!format!("{:?}", config.static_provider.users[0]).contains("secret"));
    }

    #[test]
    fn test_shared_monitor_socket_is_rejected() {
        let config = ProviderConfig {
            common: CommonConfig::default(),
            provider: default_provider(),
            domain: "CORP".to_string(),
            socket_path: PathBuf::from("/tmp/corp.sock"),
            monitor_socket: Some(PathBuf::from("/tmp/corp.sock")),
            cache_path: default_cache_path(),
            static_provider: StaticProviderConfig::default(),
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }
}
