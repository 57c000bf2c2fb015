//! Responder side of the bus: one link per remote domain, the account and PAM
//! requests sent over it, and the `Identity` answer the backends ask for.

use async_trait::async_trait;
use broker_core::bus::message::{BE_REQ_USER, DATA_PROVIDER_VERSION, DP_CLI_FRONTEND};
use broker_core::bus::{
    connect_with_retry, AccountInfoArgs, BusConnection, BusError, DpErrorMajor, DpReply,
    IdentityReply, MethodCall, MethodHandler, MethodReturn, PamHandlerArgs, PamHandlerReply,
    ReplyHandle, RetryConfig,
};
use broker_core::observability::metrics::record_backend_call;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PamError;
use crate::services::session::PamData;

pub const FRONTEND_NAME: &str = "PAM";

/// Answers calls the backends make on the responder.
pub struct FrontendIdentity;

#[async_trait]
impl MethodHandler for FrontendIdentity {
    async fn handle(&self, call: MethodCall, reply: ReplyHandle) {
        match call {
            MethodCall::Identity => reply.send(MethodReturn::Identity(IdentityReply {
                clitype: DP_CLI_FRONTEND,
                version: DATA_PROVIDER_VERSION,
                name: FRONTEND_NAME.to_string(),
                domain: String::new(),
            })),
            MethodCall::Ping => reply.send(MethodReturn::Pong),
            other => {
                let method = other.method().as_str();
                reply.error(
                    broker_core::bus::error::ERROR_UNKNOWN_METHOD,
                    format!("{} is not served by the responder", method),
                );
            }
        }
    }
}

/// Bus links to the backends, keyed by lower-cased domain name.
#[derive(Clone, Default)]
pub struct BackendLinks {
    links: Arc<DashMap<String, BusConnection>>,
}

impl BackendLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, domain: &str, conn: BusConnection) {
        self.links.insert(domain.to_lowercase(), conn);
    }

    pub fn remove(&self, domain: &str) {
        self.links.remove(&domain.to_lowercase());
    }

    /// The live link for `domain`, or `NotConnected`.
    pub fn get(&self, domain: &str) -> Result<BusConnection, BusError> {
        match self.links.get(&domain.to_lowercase()) {
            Some(conn) if !conn.is_closed() => Ok(conn.clone()),
            _ => Err(BusError::NotConnected),
        }
    }

    /// Keep a link to `socket` up for as long as the process runs.
    pub fn spawn_link(&self, domain: String, socket: PathBuf, retry: RetryConfig) -> JoinHandle<()> {
        let links = self.clone();
        tokio::spawn(async move {
            loop {
                let name = format!("backend:{}", domain);
                match connect_with_retry(&retry, &socket, &name, Arc::new(FrontendIdentity)).await
                {
                    Ok(conn) => {
                        info!(domain = %domain, socket = %socket.display(), "Backend link established");
                        links.insert(&domain, conn.clone());
                        conn.closed().await;
                        links.remove(&domain);
                        warn!(domain = %domain, "Backend link lost, reconnecting");
                    }
                    Err(e) => {
                        warn!(domain = %domain, error = %e, "Giving up on backend link");
                        return;
                    }
                }
                tokio::time::sleep(retry.initial_backoff).await;
            }
        })
    }
}

/// Ask the backend to refresh `user` in the cache.
pub async fn send_account_request(
    conn: &BusConnection,
    user: &str,
    timeout: Duration,
) -> Result<DpReply, PamError> {
    let call = MethodCall::GetAccountInfo(AccountInfoArgs {
        entry_type: BE_REQ_USER,
        attrs: Some("core".to_string()),
        filter: Some(format!("name={}", user)),
    });

    let outcome = conn.call(call, timeout)?.wait().await;
    record_backend_call("getAccountInfo", outcome_label(&outcome));
    match outcome? {
        MethodReturn::AccountInfo(reply) => {
            debug!(
                user,
                err_maj = ?reply.err_maj,
                err_min = reply.err_min,
                err_msg = %reply.err_msg,
                "Account request answered"
            );
            Ok(reply)
        }
        _ => Err(PamError::UnexpectedReply("getAccountInfo")),
    }
}

/// Forward the request to the backend and wait for its verdict.
pub async fn send_pam_request(
    conn: &BusConnection,
    pd: &PamData,
    timeout: Duration,
) -> Result<PamHandlerReply, PamError> {
    let call = MethodCall::PamHandler(pam_handler_args(pd));
    let outcome = conn.call(call, timeout)?.wait().await;
    record_backend_call("pamHandler", outcome_label(&outcome));
    match outcome? {
        MethodReturn::Pam(reply) => Ok(reply),
        _ => Err(PamError::UnexpectedReply("pamHandler")),
    }
}

fn pam_handler_args(pd: &PamData) -> PamHandlerArgs {
    let request = &pd.request;
    PamHandlerArgs {
        cmd: pd.cmd,
        domain: request.domain.clone().unwrap_or_default(),
        user: request.user.clone(),
        service: request.service.clone(),
        tty: request.tty.clone(),
        ruser: request.ruser.clone(),
        rhost: request.rhost.clone(),
        authtok_type: request.authtok.kind,
        authtok: request.authtok.data.to_vec(),
        newauthtok_type: request.newauthtok.kind,
        newauthtok: request.newauthtok.data.to_vec(),
    }
}

fn outcome_label(outcome: &Result<MethodReturn, BusError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(BusError::Timeout(_)) => "timeout",
        Err(BusError::Remote { .. }) => "error_reply",
        Err(_) => "transport_error",
    }
}

/// Map an account reply onto the session: OK and OFFLINE continue, anything
/// else fails the request.
pub fn check_dp_reply(reply: DpReply) -> Result<DpErrorMajor, PamError> {
    match reply.err_maj {
        DpErrorMajor::Ok | DpErrorMajor::Offline => Ok(reply.err_maj),
        major => Err(PamError::Backend {
            major,
            minor: reply.err_min,
            message: reply.err_msg,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_link_fails_fast() {
        let links = BackendLinks::new();
        assert!(matches!(links.get("CORP"), Err(BusError::NotConnected)));
    }

    #[tokio::test]
    async fn test_identity_answer() {
        let (reply, mut rx) = ReplyHandle::detached(1, "getIdentity");
        FrontendIdentity.handle(MethodCall::Identity, reply).await;

        match rx.recv().await.unwrap() {
            broker_core::bus::Frame::Return {
                body: MethodReturn::Identity(id),
                ..
            } => {
                assert_eq!(id.clitype, DP_CLI_FRONTEND);
                assert_eq!(id.version, 1);
                assert_eq!(id.name, "PAM");
                assert_eq!(id.domain, "");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_dp_reply_mapping() {
        assert_eq!(check_dp_reply(DpReply::success()).unwrap(), DpErrorMajor::Ok);
        let offline = DpReply {
            err_maj: DpErrorMajor::Offline,
            err_min: 0,
            err_msg: "offline".to_string(),
        };
        assert_eq!(check_dp_reply(offline).unwrap(), DpErrorMajor::Offline);
        assert!(matches!(
            check_dp_reply(DpReply::fatal(2, "No such user")),
            Err(PamError::Backend { minor: 2, .. })
        ));
    }
}
