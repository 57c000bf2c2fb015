use crate::config::PamConfig;
use crate::handlers::serve_client;
use crate::services::{BackendLinks, ProviderKind, ResponderContext};
use broker_core::bus::{bind_socket, RetryConfig};
use broker_core::cache::{IdentityCache, JsonFileCache};
use broker_core::error::AppError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

pub struct Application {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ResponderContext>,
    client_timeout: Duration,
    links: Vec<JoinHandle<()>>,
}

impl Application {
    pub async fn build(config: PamConfig) -> Result<Self, AppError> {
        tracing::info!("Using identity cache file {}", config.cache_path.display());
        let cache: Arc<dyn IdentityCache> = Arc::new(JsonFileCache::new(config.cache_path.clone()));
        Self::build_with_cache(config, cache).await
    }

    /// Like [`Application::build`] with a caller-supplied cache.
    pub async fn build_with_cache(
        config: PamConfig,
        cache: Arc<dyn IdentityCache>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let backends = BackendLinks::new();
        let mut links = Vec::new();
        for domain in &config.domains {
            if let (ProviderKind::Remote(provider), Some(socket)) =
                (domain.provider_kind(), &domain.backend_socket)
            {
                tracing::info!(
                    domain = %domain.name,
                    provider = %provider,
                    socket = %socket.display(),
                    "Linking backend"
                );
                links.push(backends.spawn_link(
                    domain.name.clone(),
                    socket.clone(),
                    RetryConfig::persistent(),
                ));
            }
        }

        let listener = bind_socket(&config.socket_path).map_err(|e| {
            tracing::error!(
                "Failed to bind client socket {}: {}",
                config.socket_path.display(),
                e
            );
            AppError::from(e)
        })?;
        tracing::info!("Listening on {}", config.socket_path.display());

        let context = Arc::new(ResponderContext::from_config(&config, cache, backends));

        Ok(Self {
            socket_path: config.socket_path.clone(),
            listener,
            context,
            client_timeout: Duration::from_millis(config.client_timeout_ms),
            links,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn context(&self) -> Arc<ResponderContext> {
        self.context.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let result = loop {
            let (stream, _) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => break Err(e),
            };
            let ctx = self.context.clone();
            let timeout = self.client_timeout;
            tokio::spawn(serve_client(ctx, stream, timeout));
        };

        for link in &self.links {
            link.abort();
        }
        result
    }
}
