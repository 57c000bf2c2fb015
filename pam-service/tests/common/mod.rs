#![allow(dead_code)]

use async_trait::async_trait;
use broker_core::bus::{
    BusConnection, DpErrorMajor, DpReply, MethodCall, MethodHandler, MethodReturn,
    PamHandlerArgs, PamHandlerReply, ReplyHandle,
};
use broker_core::cache::{IdentityCache, MemoryCache, UserRecord};
use broker_core::pam::PamStatus;
use bytes::Bytes;
use pam_service::codec::request::encode_v2;
use pam_service::codec::{AuthTok, PamRequest};
use pam_service::names::NameParser;
use pam_service::services::{BackendLinks, DomainInfo, DomainList, FrontendIdentity, ResponderContext};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_PASSWORD: &[u8] = b"correct horse";

/// A scripted backend: counts calls, optionally refreshes the cache on an
/// account request and answers PAM requests with a fixed status.
pub struct FakeBackend {
    pub domain: String,
    pub cache: Arc<dyn IdentityCache>,
    pub account_calls: AtomicUsize,
    pub pam_calls: AtomicUsize,
    pub account_reply: Mutex<DpReply>,
    pub refresh: Mutex<Option<UserRecord>>,
    pub pam_status: AtomicU32,
    pub last_pam: Mutex<Option<PamHandlerArgs>>,
}

impl FakeBackend {
    pub fn new(domain: &str, cache: Arc<dyn IdentityCache>) -> Arc<Self> {
        Arc::new(Self {
            domain: domain.to_string(),
            cache,
            account_calls: AtomicUsize::new(0),
            pam_calls: AtomicUsize::new(0),
            account_reply: Mutex::new(DpReply::success()),
            refresh: Mutex::new(None),
            pam_status: AtomicU32::new(PamStatus::Success.code() as u32),
            last_pam: Mutex::new(None),
        })
    }

    pub fn go_offline(&self) {
        *self.account_reply.lock().unwrap() = DpReply {
            err_maj: DpErrorMajor::Offline,
            err_min: 0,
            err_msg: "Backend is offline".to_string(),
        };
    }

    pub fn refresh_with(&self, record: UserRecord) {
        *self.refresh.lock().unwrap() = Some(record);
    }

    pub fn answer_pam(&self, status: PamStatus) {
        self.pam_status.store(status.code() as u32, Ordering::SeqCst);
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub fn pam_calls(&self) -> usize {
        self.pam_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MethodHandler for FakeBackend {
    async fn handle(&self, call: MethodCall, reply: ReplyHandle) {
        match call {
            MethodCall::GetAccountInfo(_) => {
                self.account_calls.fetch_add(1, Ordering::SeqCst);
                let refresh = self.refresh.lock().unwrap().clone();
                if let Some(mut record) = refresh {
                    record.last_update = Some(chrono::Utc::now().timestamp());
                    self.cache.store_user(&self.domain, record).await.unwrap();
                }
                let answer = self.account_reply.lock().unwrap().clone();
                reply.send(MethodReturn::AccountInfo(answer));
            }
            MethodCall::PamHandler(args) => {
                self.pam_calls.fetch_add(1, Ordering::SeqCst);
                *self.last_pam.lock().unwrap() = Some(args);
                reply.send(MethodReturn::Pam(PamHandlerReply {
                    pam_status: self.pam_status.load(Ordering::SeqCst),
                    domain: String::new(),
                }));
            }
            MethodCall::Ping => reply.send(MethodReturn::Pong),
            _ => {}
        }
    }
}

pub struct TestResponder {
    pub ctx: ResponderContext,
    pub cache: Arc<MemoryCache>,
    // Backend ends of the duplex links, kept alive for the test.
    backend_ends: Vec<BusConnection>,
}

impl TestResponder {
    pub fn new(domains: Vec<DomainInfo>) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let ctx = ResponderContext {
            domains: DomainList::new(domains),
            names: NameParser::default(),
            cache: cache.clone(),
            backends: BackendLinks::new(),
            backend_timeout: Duration::from_secs(2),
            cache_timeout_secs: 30,
            failed_login_delay_secs: 0,
        };
        Self {
            ctx,
            cache,
            backend_ends: Vec::new(),
        }
    }

    /// Wire a fake backend for `domain` through an in-memory bus link.
    pub fn attach_backend(&mut self, domain: &str) -> Arc<FakeBackend> {
        let backend = FakeBackend::new(domain, self.cache.clone());
        let (responder_side, backend_side) = tokio::io::duplex(64 * 1024);
        let backend_end =
            BusConnection::spawn(format!("test-backend:{}", domain), backend_side, backend.clone());
        let responder_end =
            BusConnection::spawn(format!("backend:{}", domain), responder_side, Arc::new(FrontendIdentity));
        self.ctx.backends.insert(domain, responder_end);
        self.backend_ends.push(backend_end);
        backend
    }

    pub async fn seed_user(&self, domain: &str, name: &str, uid: u32, age_secs: i64) {
        let mut record = UserRecord::new(name, uid, uid);
        record.last_update = Some(chrono::Utc::now().timestamp() - age_secs);
        self.cache.store_user(domain, record).await.unwrap();
    }
}

pub fn request(user: &str, password: &'static [u8]) -> PamRequest {
    PamRequest {
        user: user.to_string(),
        service: "login".to_string(),
        tty: "tty1".to_string(),
        authtok: if password.is_empty() {
            AuthTok::default()
        } else {
            AuthTok::password(password)
        },
        ..Default::default()
    }
}

/// A version 2 request body for `qualified` (`user` or `user@domain`).
pub fn v2_body(qualified: &str, password: &'static [u8]) -> Bytes {
    let names = NameParser::default();
    let (user, domain) = names.parse(qualified).unwrap();
    let mut req = request(&user, password);
    req.domain = domain;
    encode_v2(&req, &names)
}

pub fn domain_of(responses: &pam_service::response::ResponseList) -> Option<String> {
    responses
        .iter()
        .find(|item| item.kind == pam_service::response::PAM_DOMAIN_NAME)
        .map(|item| {
            String::from_utf8_lossy(item.data.strip_suffix(b"\0").unwrap_or(&item.data[..])).into_owned()
        })
}

/// A responder listening on a socket inside a temporary directory.
pub struct TestApp {
    pub socket_path: std::path::PathBuf,
    pub cache: Arc<MemoryCache>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn spawn(domains: Vec<DomainInfo>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("pam.sock");
        let config = pam_service::config::PamConfig {
            common: broker_core::config::CommonConfig::default(),
            socket_path: socket_path.clone(),
            client_timeout_ms: 10_000,
            entry_cache_timeout_secs: 30,
            failed_login_delay_secs: 0,
            cache_path: dir.path().join("cache.json"),
            domains,
        };

        let cache = Arc::new(MemoryCache::new());
        let app = pam_service::startup::Application::build_with_cache(config, cache.clone())
            .await
            .expect("Failed to build test application");
        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            socket_path,
            cache,
            _dir: dir,
        }
    }

    pub async fn client(
        &self,
    ) -> tokio_util::codec::Framed<tokio::net::UnixStream, pam_service::codec::PacketCodec> {
        let stream = tokio::net::UnixStream::connect(&self.socket_path)
            .await
            .expect("Failed to connect to responder");
        tokio_util::codec::Framed::new(stream, pam_service::codec::PacketCodec)
    }
}
