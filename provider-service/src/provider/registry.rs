//! Maps provider names to constructors, so a backend can be told which module
//! to load by configuration alone.

use broker_core::cache::IdentityCache;
use broker_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;

use super::static_provider::{StaticProvider, STATIC_PROVIDER};
use super::Provider;
use crate::config::ProviderConfig;

pub type ProviderFactory =
    fn(&ProviderConfig, Arc<dyn IdentityCache>) -> Result<Arc<dyn Provider>, AppError>;

pub struct ProviderRegistry {
    factories: HashMap<&'static str, ProviderFactory>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(STATIC_PROVIDER, build_static);
        registry
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, factory: ProviderFactory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build the provider named in `config.provider`.
    pub fn load(
        &self,
        config: &ProviderConfig,
        cache: Arc<dyn IdentityCache>,
    ) -> Result<Arc<dyn Provider>, AppError> {
        let factory = self.factories.get(config.provider.as_str()).ok_or_else(|| {
            AppError::Config(anyhow::anyhow!(
                "unknown provider '{}' (available: {})",
                config.provider,
                self.names().join(", ")
            ))
        })?;
        tracing::info!(provider = %config.provider, domain = %config.domain, "Loading provider");
        factory(config, cache)
    }
}

fn build_static(
    config: &ProviderConfig,
    cache: Arc<dyn IdentityCache>,
) -> Result<Arc<dyn Provider>, AppError> {
    Ok(Arc::new(StaticProvider::new(
        config.domain.clone(),
        &config.static_provider,
        cache,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticProviderConfig;
    use broker_core::cache::MemoryCache;
    use broker_core::config::CommonConfig;
    use std::path::PathBuf;

    fn config(provider: &str) -> ProviderConfig {
        ProviderConfig {
            common: CommonConfig::default(),
            provider: provider.to_string(),
            domain: "CORP".to_string(),
            socket_path: PathBuf::from("/tmp/corp.sock"),
            monitor_socket: None,
            cache_path: broker_core::cache::default_cache_path(),
            static_provider: StaticProviderConfig::default(),
        }
    }

    #[test]
    fn test_builtin_static_provider() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.names(), vec!["static"]);
        let provider = registry
            .load(&config("static"), Arc::new(MemoryCache::new()))
            .unwrap();
        assert_eq!(provider.name(), "static");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .load(&config("ldap"), Arc::new(MemoryCache::new()))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("ldap"));
    }
}
