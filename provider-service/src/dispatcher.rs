//! The data-provider interface: routes inbound bus calls to the provider.

use async_trait::async_trait;
use broker_core::bus::error::ERROR_UNKNOWN_METHOD;
use broker_core::bus::message::{DATA_PROVIDER_VERSION, DP_CLI_BACKEND, MOD_OFFLINE, MOD_ONLINE};
use broker_core::bus::{
    AccountInfoArgs, DpErrorMajor, DpReply, IdentityReply, MethodCall, MethodHandler,
    MethodReturn, OnlineReply, PamHandlerReply, ReplyHandle,
};
use broker_core::error::AppError;
use broker_core::observability::metrics::record_provider_job;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::job::BackendJob;
use crate::provider::{
    AccountRequest, AttrSelector, EntryType, Filter, Provider, ProviderError, EINVAL,
};

pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    domain: String,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn Provider>, domain: impl Into<String>) -> Self {
        Self {
            provider,
            domain: domain.into(),
        }
    }

    fn identity(&self) -> IdentityReply {
        IdentityReply {
            clitype: DP_CLI_BACKEND,
            version: DATA_PROVIDER_VERSION,
            name: self.provider.name().to_string(),
            domain: self.domain.clone(),
        }
    }

    fn is_online(&self, reply: ReplyHandle) {
        let provider = self.provider.clone();
        BackendJob::new("isOnline", reply).file(async move {
            match provider.check_online().await {
                Ok(online) => (
                    "ok",
                    MethodReturn::Online(OnlineReply {
                        status: if online { MOD_ONLINE } else { MOD_OFFLINE },
                        err_maj: DpErrorMajor::Ok,
                        err_min: 0,
                        err_msg: "Success".to_string(),
                    }),
                ),
                Err(e) => {
                    let triple = e.to_dp_reply();
                    (
                        "error",
                        MethodReturn::Online(OnlineReply {
                            status: MOD_OFFLINE,
                            err_maj: DpErrorMajor::Fatal,
                            err_min: triple.err_min,
                            err_msg: triple.err_msg,
                        }),
                    )
                }
            }
        });
    }

    fn get_account_info(&self, args: AccountInfoArgs, reply: ReplyHandle) {
        let request = match validate_account_request(&args) {
            Ok(request) => request,
            Err(message) => {
                debug!(error = %message, "Rejecting account request");
                record_provider_job("getAccountInfo", "invalid");
                reply.send(MethodReturn::AccountInfo(DpReply::fatal(EINVAL, message)));
                return;
            }
        };

        let provider = self.provider.clone();
        BackendJob::new("getAccountInfo", reply).file(async move {
            match provider.get_account_info(&request).await {
                Ok(()) => ("ok", MethodReturn::AccountInfo(DpReply::success())),
                Err(e @ ProviderError::NotFound(_)) => {
                    debug!(filter = ?request.filter, "No such entry");
                    ("not_found", MethodReturn::AccountInfo(e.to_dp_reply()))
                }
                Err(e) => {
                    debug!(filter = ?request.filter, error = %e, "Account request failed");
                    ("error", MethodReturn::AccountInfo(e.to_dp_reply()))
                }
            }
        });
    }

    fn pam_handler(&self, args: broker_core::bus::PamHandlerArgs, reply: ReplyHandle) {
        let provider = self.provider.clone();
        let domain = self.domain.clone();
        BackendJob::new("pamHandler", reply).file(async move {
            let (outcome, status) = match provider.pam_handler(&args).await {
                Ok(status) => ("ok", status),
                Err(e) => {
                    warn!(user = %args.user, command = %args.cmd, error = %e, "PAM request failed");
                    ("error", AppError::from(e).pam_status())
                }
            };
            (
                outcome,
                MethodReturn::Pam(PamHandlerReply {
                    pam_status: status.code() as u32,
                    domain,
                }),
            )
        });
    }
}

#[async_trait]
impl MethodHandler for Dispatcher {
    async fn handle(&self, call: MethodCall, reply: ReplyHandle) {
        match call {
            MethodCall::Identity => reply.send(MethodReturn::Identity(self.identity())),
            MethodCall::Ping => reply.send(MethodReturn::Pong),
            MethodCall::IsOnline => self.is_online(reply),
            MethodCall::GetAccountInfo(args) => self.get_account_info(args, reply),
            MethodCall::PamHandler(args) => self.pam_handler(args, reply),
            MethodCall::ServiceIdentity => reply.error(
                ERROR_UNKNOWN_METHOD,
                "getServiceIdentity is served on the monitor socket",
            ),
        }
    }
}

/// Check the selector strings of a `getAccountInfo` call.
pub fn validate_account_request(args: &AccountInfoArgs) -> Result<AccountRequest, String> {
    let entry_type = EntryType::from_code(args.entry_type)
        .ok_or_else(|| format!("Unknown entry type {}", args.entry_type))?;

    let attrs = match args.attrs.as_deref() {
        Some("core") => AttrSelector::Core,
        Some("membership") => AttrSelector::Membership,
        Some("all") => AttrSelector::All,
        Some(other) => return Err(format!("Invalid attrs '{}'", other)),
        None => return Err("Missing attrs".to_string()),
    };

    let filter = args.filter.as_deref().ok_or("Missing filter")?;
    let filter = if let Some(name) = filter.strip_prefix("name=") {
        if name.is_empty() {
            return Err("Empty name filter".to_string());
        }
        Filter::Name(name.to_string())
    } else if let Some(id) = filter.strip_prefix("idnumber=") {
        let id = id
            .parse::<u32>()
            .map_err(|_| format!("Invalid idnumber filter '{}'", filter))?;
        Filter::IdNumber(id)
    } else {
        return Err(format!("Invalid filter '{}'", filter));
    };

    Ok(AccountRequest {
        entry_type,
        attrs,
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::bus::message::{BE_REQ_GROUP, BE_REQ_USER};

    fn args(entry_type: u32, attrs: Option<&str>, filter: Option<&str>) -> AccountInfoArgs {
        AccountInfoArgs {
            entry_type,
            attrs: attrs.map(str::to_string),
            filter: filter.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_selectors() {
        let request = validate_account_request(&args(BE_REQ_USER, Some("core"), Some("name=alice"))).unwrap();
        assert_eq!(request.entry_type, EntryType::User);
        assert_eq!(request.filter, Filter::Name("alice".to_string()));

        let request =
            validate_account_request(&args(BE_REQ_GROUP, Some("all"), Some("idnumber=42"))).unwrap();
        assert_eq!(request.attrs, AttrSelector::All);
        assert_eq!(request.filter, Filter::IdNumber(42));
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in [
            args(99, Some("core"), Some("name=alice")),
            args(BE_REQ_USER, None, Some("name=alice")),
            args(BE_REQ_USER, Some("everything"), Some("name=alice")),
            args(BE_REQ_USER, Some("core"), None),
            args(BE_REQ_USER, Some("core"), Some("name=")),
            args(BE_REQ_USER, Some("core"), Some("idnumber=abc")),
            args(BE_REQ_USER, Some("core"), Some("uid=1000")),
        ] {
            assert!(validate_account_request(&bad).is_err(), "{:?}", bad);
        }
    }
}
