//! One task per client connection: read packets, answer them in order.

use broker_core::observability::metrics::record_pam_request;
use broker_core::pam::PamCommand;
use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn, Instrument};

use crate::codec::packet::SSS_GET_VERSION;
use crate::codec::request::{PROTOCOL_V1, PROTOCOL_V2};
use crate::codec::{encode_reply, ClientPacket, PacketCodec};
use crate::services::session;
use crate::services::ResponderContext;

/// Header status for a command the responder does not know.
pub const EINVAL: u32 = 22;

const SUPPORTED_VERSIONS: [u32; 2] = [PROTOCOL_V1, PROTOCOL_V2];

/// Per-connection protocol state.
#[derive(Debug)]
pub struct ClientSession {
    version: u32,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self {
            version: PROTOCOL_V1,
        }
    }
}

impl ClientSession {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Pick the version a client asked for, falling back to version 1.
    pub fn negotiate(&mut self, body: &Bytes) -> u32 {
        let requested = match body.as_ref() {
            [a, b, c, d, ..] => Some(u32::from_le_bytes([*a, *b, *c, *d])),
            _ => None,
        };
        self.version = requested
            .filter(|v| SUPPORTED_VERSIONS.contains(v))
            .unwrap_or(PROTOCOL_V1);
        debug!(requested = ?requested, selected = self.version, "Protocol version negotiated");
        self.version
    }

    /// Produce the reply packet for one request packet.
    pub async fn handle_packet(&mut self, ctx: &ResponderContext, packet: ClientPacket) -> ClientPacket {
        if packet.cmd == SSS_GET_VERSION {
            let version = self.negotiate(&packet.body);
            let mut body = BytesMut::with_capacity(4);
            body.put_u32_le(version);
            return ClientPacket::new(packet.cmd, body.freeze());
        }

        let Some(cmd) = PamCommand::from_code(packet.cmd) else {
            warn!(cmd = packet.cmd, "Unknown client command");
            return ClientPacket::with_status(packet.cmd, EINVAL);
        };

        let span = tracing::info_span!("pam_request", command = %cmd, version = self.version);
        let pd = session::process(ctx, cmd, self.version, &packet.body)
            .instrument(span)
            .await;

        record_pam_request(cmd.as_str(), pd.status.code());
        info!(
            command = %cmd,
            user = %pd.request.user,
            domain = pd.request.domain.as_deref().unwrap_or(""),
            status = pd.status.code(),
            "PAM request answered"
        );
        ClientPacket::new(packet.cmd, encode_reply(pd.status, &pd.responses))
    }
}

/// Serve a single client until it hangs up, goes idle past `idle_timeout` or
/// sends a malformed packet.
pub async fn serve_client<S>(ctx: Arc<ResponderContext>, stream: S, idle_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, PacketCodec);
    let mut client = ClientSession::default();

    loop {
        let packet = match tokio::time::timeout(idle_timeout, framed.next()).await {
            Err(_) => {
                debug!("Client idle, closing connection");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "Dropping client after bad packet");
                return;
            }
            Ok(Some(Ok(packet))) => packet,
        };

        let reply = client.handle_packet(&ctx, packet).await;
        if let Err(e) = framed.send(reply).await {
            warn!(error = %e, "Failed to write reply");
            return;
        }
    }
}
