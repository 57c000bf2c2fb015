//! The monitor interface: lets a supervisor check that the backend is alive.

use async_trait::async_trait;
use broker_core::bus::error::ERROR_UNKNOWN_METHOD;
use broker_core::bus::message::DATA_PROVIDER_VERSION;
use broker_core::bus::{MethodCall, MethodHandler, MethodReturn, ReplyHandle, ServiceIdentityReply};

pub struct Monitor {
    name: String,
}

impl Monitor {
    pub fn new(domain: &str) -> Self {
        Self {
            name: format!("%BE_{}", domain),
        }
    }
}

#[async_trait]
impl MethodHandler for Monitor {
    async fn handle(&self, call: MethodCall, reply: ReplyHandle) {
        match call {
            MethodCall::ServiceIdentity => reply.send(MethodReturn::ServiceIdentity(ServiceIdentityReply {
                name: self.name.clone(),
                version: DATA_PROVIDER_VERSION,
            })),
            MethodCall::Ping => reply.send(MethodReturn::Pong),
            other => reply.error(
                ERROR_UNKNOWN_METHOD,
                format!("{} is not part of the monitor interface", other.method().as_str()),
            ),
        }
    }
}
