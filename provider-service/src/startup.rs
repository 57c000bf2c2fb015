use crate::config::ProviderConfig;
use crate::dispatcher::Dispatcher;
use crate::monitor::Monitor;
use crate::provider::{Provider, ProviderRegistry};
use crate::server::serve_bus;
use broker_core::bus::bind_socket;
use broker_core::cache::{IdentityCache, JsonFileCache};
use broker_core::error::AppError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;

pub struct Application {
    socket_path: PathBuf,
    listener: UnixListener,
    monitor: Option<UnixListener>,
    dispatcher: Arc<Dispatcher>,
    domain: String,
    provider: Arc<dyn Provider>,
}

impl Application {
    pub async fn build(config: ProviderConfig) -> Result<Self, AppError> {
        tracing::info!("Using identity cache file {}", config.cache_path.display());
        let cache: Arc<dyn IdentityCache> = Arc::new(JsonFileCache::new(config.cache_path.clone()));
        Self::build_with_cache(config, cache).await
    }

    /// Like [`Application::build`] with a caller-supplied cache.
    pub async fn build_with_cache(
        config: ProviderConfig,
        cache: Arc<dyn IdentityCache>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let provider = ProviderRegistry::new().load(&config, cache)?;
        let dispatcher = Arc::new(Dispatcher::new(provider.clone(), config.domain.clone()));

        let listener = bind_socket(&config.socket_path).map_err(|e| {
            tracing::error!(
                "Failed to bind bus socket {}: {}",
                config.socket_path.display(),
                e
            );
            AppError::from(e)
        })?;
        tracing::info!("Listening on {}", config.socket_path.display());

        let monitor = match &config.monitor_socket {
            Some(path) => {
                let listener = bind_socket(path).map_err(|e| {
                    tracing::error!("Failed to bind monitor socket {}: {}", path.display(), e);
                    AppError::from(e)
                })?;
                tracing::info!("Monitor listening on {}", path.display());
                Some(listener)
            }
            None => None,
        };

        Ok(Self {
            socket_path: config.socket_path.clone(),
            listener,
            monitor,
            dispatcher,
            domain: config.domain.clone(),
            provider,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.provider.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let name = format!("provider:{}", self.domain);
        let bus = serve_bus(&name, self.listener, self.dispatcher, true);

        match self.monitor {
            Some(listener) => {
                let monitor_name = format!("monitor:{}", self.domain);
                let monitor = serve_bus(
                    &monitor_name,
                    listener,
                    Arc::new(Monitor::new(&self.domain)),
                    false,
                );
                tokio::select! {
                    result = bus => result,
                    result = monitor => result,
                }
            }
            None => bus.await,
        }
    }
}
