//! Bus listeners for the backend.

use broker_core::bus::{BusConnection, MethodCall, MethodHandler, MethodReturn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept bus peers on `listener` and serve `handler` to each. With
/// `introduce`, every new peer is asked for its identity.
pub async fn serve_bus(
    name: &str,
    listener: UnixListener,
    handler: Arc<dyn MethodHandler>,
    introduce: bool,
) -> std::io::Result<()> {
    let mut peers: u64 = 0;
    loop {
        let (stream, _) = listener.accept().await?;
        peers += 1;
        let conn = BusConnection::spawn(format!("{}#{}", name, peers), stream, handler.clone());
        debug!(connection = %conn.name(), "Bus peer connected");

        if introduce {
            request_identity(&conn);
        }
    }
}

fn request_identity(conn: &BusConnection) {
    let conn_name = conn.name().to_string();
    match conn.call(MethodCall::Identity, IDENTITY_TIMEOUT) {
        Ok(pending) => pending.set_notify(move |outcome| match outcome {
            Ok(MethodReturn::Identity(id)) => info!(
                connection = %conn_name,
                peer = %id.name,
                clitype = id.clitype,
                version = id.version,
                "Peer identified"
            ),
            Ok(other) => warn!(connection = %conn_name, reply = ?other, "Unexpected identity reply"),
            Err(e) => warn!(connection = %conn_name, error = %e, "Peer did not identify"),
        }),
        Err(e) => warn!(connection = %conn_name, error = %e, "Could not ask peer for identity"),
    }
}
