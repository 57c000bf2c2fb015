use broker_core::observability::metrics::render;
use broker_core::observability::{init_metrics, init_tracing};
use pam_service::config::PamConfig;
use pam_service::startup::Application;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PamConfig::load()?;

    init_tracing(
        "pam-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;
    init_metrics()?;

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start PAM responder: {}", e);
        e
    })?;
    let socket_path = app.socket_path().to_path_buf();

    tokio::select! {
        result = app.run_until_stopped() => {
            if let Err(e) = result {
                tracing::error!("Client listener failed: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    if let Some(snapshot) = render() {
        tracing::debug!(metrics = %snapshot, "Final metrics snapshot");
    }
    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!("Could not remove {}: {}", socket_path.display(), e);
    }
    Ok(())
}
