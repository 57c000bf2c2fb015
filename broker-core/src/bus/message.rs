//! Frames and typed payloads carried on the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::BusError;
use crate::pam::{AuthTokType, PamCommand};

pub const DATA_PROVIDER_VERSION: u16 = 1;

pub const DP_CLI_BACKEND: u16 = 1;
pub const DP_CLI_FRONTEND: u16 = 2;

pub const BE_REQ_USER: u32 = 0x0001;
pub const BE_REQ_GROUP: u32 = 0x0002;
pub const BE_REQ_INITGROUPS: u32 = 0x0003;

pub const MOD_OFFLINE: u16 = 0;
pub const MOD_ONLINE: u16 = 1;

/// Major error class in data-provider replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum DpErrorMajor {
    Ok,
    Offline,
    Timeout,
    Fatal,
    Other(u16),
}

impl From<u16> for DpErrorMajor {
    fn from(value: u16) -> Self {
        match value {
            0 => DpErrorMajor::Ok,
            1 => DpErrorMajor::Offline,
            2 => DpErrorMajor::Timeout,
            3 => DpErrorMajor::Fatal,
            other => DpErrorMajor::Other(other),
        }
    }
}

impl From<DpErrorMajor> for u16 {
    fn from(value: DpErrorMajor) -> Self {
        match value {
            DpErrorMajor::Ok => 0,
            DpErrorMajor::Offline => 1,
            DpErrorMajor::Timeout => 2,
            DpErrorMajor::Fatal => 3,
            DpErrorMajor::Other(other) => other,
        }
    }
}

/// Method names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Identity,
    Ping,
    IsOnline,
    GetAccountInfo,
    PamHandler,
    ServiceIdentity,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Identity => "getIdentity",
            Method::Ping => "ping",
            Method::IsOnline => "isOnline",
            Method::GetAccountInfo => "getAccountInfo",
            Method::PamHandler => "pamHandler",
            Method::ServiceIdentity => "getServiceIdentity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "getIdentity" => Some(Method::Identity),
            "ping" => Some(Method::Ping),
            "isOnline" => Some(Method::IsOnline),
            "getAccountInfo" => Some(Method::GetAccountInfo),
            "pamHandler" => Some(Method::PamHandler),
            "getServiceIdentity" => Some(Method::ServiceIdentity),
            _ => None,
        }
    }
}

/// Arguments of `getAccountInfo`. `attrs` and `filter` stay optional so the
/// receiving side can tell a missing selector from a malformed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoArgs {
    pub entry_type: u32,
    #[serde(default)]
    pub attrs: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
}

/// Arguments of `pamHandler`: the flattened request as the responder decoded it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PamHandlerArgs {
    pub cmd: PamCommand,
    pub domain: String,
    pub user: String,
    pub service: String,
    pub tty: String,
    pub ruser: String,
    pub rhost: String,
    pub authtok_type: AuthTokType,
    pub authtok: Vec<u8>,
    pub newauthtok_type: AuthTokType,
    pub newauthtok: Vec<u8>,
}

impl std::fmt::Debug for PamHandlerArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamHandlerArgs")
            .field("cmd", &self.cmd)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("service", &self.service)
            .field("tty", &self.tty)
            .field("ruser", &self.ruser)
            .field("rhost", &self.rhost)
            .field("authtok_type", &self.authtok_type)
            .field("authtok_len", &self.authtok.len())
            .field("newauthtok_type", &self.newauthtok_type)
            .field("newauthtok_len", &self.newauthtok.len())
            .finish()
    }
}

/// An inbound or outbound method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    Identity,
    Ping,
    IsOnline,
    GetAccountInfo(AccountInfoArgs),
    PamHandler(PamHandlerArgs),
    ServiceIdentity,
}

impl MethodCall {
    pub fn method(&self) -> Method {
        match self {
            MethodCall::Identity => Method::Identity,
            MethodCall::Ping => Method::Ping,
            MethodCall::IsOnline => Method::IsOnline,
            MethodCall::GetAccountInfo(_) => Method::GetAccountInfo,
            MethodCall::PamHandler(_) => Method::PamHandler,
            MethodCall::ServiceIdentity => Method::ServiceIdentity,
        }
    }

    /// Split into the wire method name and its JSON arguments.
    pub fn into_parts(self) -> Result<(&'static str, Value), BusError> {
        let method = self.method().as_str();
        let args = match self {
            MethodCall::GetAccountInfo(args) => serde_json::to_value(args)?,
            MethodCall::PamHandler(args) => serde_json::to_value(args)?,
            MethodCall::Identity
            | MethodCall::Ping
            | MethodCall::IsOnline
            | MethodCall::ServiceIdentity => Value::Null,
        };
        Ok((method, args))
    }

    /// Rebuild a typed call from a received frame.
    pub fn from_parts(method: &str, args: Value) -> Result<Self, BusError> {
        let method =
            Method::from_name(method).ok_or_else(|| BusError::UnknownMethod(method.to_string()))?;
        let call = match method {
            Method::Identity => MethodCall::Identity,
            Method::Ping => MethodCall::Ping,
            Method::IsOnline => MethodCall::IsOnline,
            Method::ServiceIdentity => MethodCall::ServiceIdentity,
            Method::GetAccountInfo => MethodCall::GetAccountInfo(
                serde_json::from_value(args).map_err(|e| BusError::InvalidArgs(e.to_string()))?,
            ),
            Method::PamHandler => MethodCall::PamHandler(
                serde_json::from_value(args).map_err(|e| BusError::InvalidArgs(e.to_string()))?,
            ),
        };
        Ok(call)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityReply {
    pub clitype: u16,
    pub version: u16,
    pub name: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineReply {
    pub status: u16,
    pub err_maj: DpErrorMajor,
    pub err_min: u32,
    pub err_msg: String,
}

/// The `(err_major, err_minor, err_msg)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpReply {
    pub err_maj: DpErrorMajor,
    pub err_min: u32,
    pub err_msg: String,
}

impl DpReply {
    pub fn success() -> Self {
        Self {
            err_maj: DpErrorMajor::Ok,
            err_min: 0,
            err_msg: "Success".to_string(),
        }
    }

    pub fn fatal(err_min: u32, err_msg: impl Into<String>) -> Self {
        Self {
            err_maj: DpErrorMajor::Fatal,
            err_min,
            err_msg: err_msg.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PamHandlerReply {
    pub pam_status: u32,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentityReply {
    pub name: String,
    pub version: u16,
}

/// Successful method results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum MethodReturn {
    Identity(IdentityReply),
    Pong,
    Online(OnlineReply),
    AccountInfo(DpReply),
    Pam(PamHandlerReply),
    ServiceIdentity(ServiceIdentityReply),
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Call {
        serial: u64,
        method: String,
        #[serde(default)]
        args: Value,
    },
    Return {
        reply_serial: u64,
        body: MethodReturn,
    },
    Error {
        reply_serial: u64,
        name: String,
        message: String,
    },
}
