use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Settings every broker process carries.
#[derive(Debug, Deserialize, Clone)]
pub struct CommonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint; spans are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load a process configuration from an optional `<file_stem>.{toml,yaml,json}`
/// file overlaid with `<env_prefix>__SECTION__KEY` environment variables.
pub fn load<T: DeserializeOwned>(file_stem: &str, env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
