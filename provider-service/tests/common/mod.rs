#![allow(dead_code)]

use broker_core::bus::{BusConnection, MethodCall, MethodReturn};
use broker_core::cache::MemoryCache;
use pam_service::services::FrontendIdentity;
use provider_service::config::{StaticProviderConfig, StaticUser};
use provider_service::dispatcher::Dispatcher;
use provider_service::provider::StaticProvider;
use std::sync::Arc;
use std::time::Duration;

pub const DOMAIN: &str = "CORP";
pub const PASSWORD: &str = "hunter2";
pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

pub fn static_config() -> StaticProviderConfig {
    StaticProviderConfig {
        online: true,
        users: vec![StaticUser {
            name: "alice".to_string(),
            uid: 1000,
            gid: 1000,
            password: PASSWORD.to_string(),
        }],
    }
}

/// A dispatcher on one end of an in-memory bus link, a caller on the other.
pub struct TestBackend {
    pub caller: BusConnection,
    pub provider: Arc<StaticProvider>,
    pub cache: Arc<MemoryCache>,
    _server: BusConnection,
}

impl TestBackend {
    pub fn spawn() -> Self {
        let cache = Arc::new(MemoryCache::new());
        let provider = Arc::new(StaticProvider::new(DOMAIN, &static_config(), cache.clone()));
        let dispatcher = Arc::new(Dispatcher::new(provider.clone(), DOMAIN));

        let (caller_side, server_side) = tokio::io::duplex(64 * 1024);
        let server = BusConnection::spawn("test-provider", server_side, dispatcher);
        let caller = BusConnection::spawn("test-responder", caller_side, Arc::new(FrontendIdentity));

        TestBackend {
            caller,
            provider,
            cache,
            _server: server,
        }
    }

    pub async fn call(&self, call: MethodCall) -> MethodReturn {
        self.caller
            .call(call, CALL_TIMEOUT)
            .expect("Failed to send call")
            .wait()
            .await
            .expect("Call failed")
    }
}
