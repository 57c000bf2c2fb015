//! The PAM request state machine.
//!
//! ```text
//! Forward -> Route -> CheckCache <-> QueryProvider -> Dispatch -> Reply
//!              ^          |
//!              +- next domain on a miss (short names only)
//! ```
//!
//! `check_provider` is cleared before the first backend call and never set
//! again for the same domain, so each domain costs at most one account request.

use broker_core::cache::{IdentityCache, UserRecord};
use broker_core::pam::{AuthTokType, PamCommand, PamStatus};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{decode_request, PamRequest};
use crate::config::PamConfig;
use crate::error::PamError;
use crate::names::NameParser;
use crate::response::{ResponseList, PAM_DOMAIN_NAME};
use crate::services::backend::{
    check_dp_reply, send_account_request, send_pam_request, BackendLinks,
};
use crate::services::domains::{DomainInfo, DomainList, ProviderKind};
use crate::services::freshness::{self, GateDecision};
use crate::services::local_auth::{cache_auth, local_pam_handler};
use broker_core::bus::DpErrorMajor;

/// Everything a request needs from the responder process.
pub struct ResponderContext {
    pub domains: DomainList,
    pub names: NameParser,
    pub cache: Arc<dyn IdentityCache>,
    pub backends: BackendLinks,
    pub backend_timeout: Duration,
    pub cache_timeout_secs: i64,
    pub failed_login_delay_secs: u64,
}

impl ResponderContext {
    pub fn from_config(
        config: &PamConfig,
        cache: Arc<dyn IdentityCache>,
        backends: BackendLinks,
    ) -> Self {
        Self {
            domains: DomainList::new(config.domains.clone()),
            names: NameParser::default(),
            cache,
            backends,
            backend_timeout: config.backend_timeout(),
            cache_timeout_secs: config.entry_cache_timeout_secs,
            failed_login_delay_secs: config.failed_login_delay_secs,
        }
    }
}

/// A request and the answer being built for it.
#[derive(Debug)]
pub struct PamData {
    pub cmd: PamCommand,
    pub request: PamRequest,
    pub status: PamStatus,
    /// Seconds to hold the reply back. Consumed when the delay fires.
    pub response_delay: u64,
    pub offline_auth: bool,
    pub responses: ResponseList,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl PamData {
    pub fn new(cmd: PamCommand, request: PamRequest) -> Self {
        Self {
            cmd,
            request,
            status: PamStatus::Success,
            response_delay: 0,
            offline_auth: false,
            responses: ResponseList::new(),
            uid: None,
            gid: None,
        }
    }
}

#[derive(Debug)]
enum Step {
    Route,
    CheckCache,
    Evaluate(Vec<UserRecord>),
    QueryProvider,
    Dispatch(UserRecord),
    Reply,
}

/// Decode `body` and run the request to completion. The returned data holds
/// the final status and response items, domain item included.
pub async fn process(
    ctx: &ResponderContext,
    cmd: PamCommand,
    version: u32,
    body: &Bytes,
) -> PamData {
    match decode_request(version, body, &ctx.names) {
        Ok(request) => PamSession::new(ctx, cmd, request).run().await,
        Err(e) => {
            warn!(command = %cmd, error = %e, "Rejecting malformed request");
            let mut pd = PamData::new(cmd, PamRequest::default());
            pd.status = PamError::from(e).status();
            pd
        }
    }
}

pub struct PamSession<'a> {
    ctx: &'a ResponderContext,
    pd: PamData,
    domain: Option<usize>,
    check_provider: bool,
    retained: Option<UserRecord>,
}

impl<'a> PamSession<'a> {
    pub fn new(ctx: &'a ResponderContext, cmd: PamCommand, request: PamRequest) -> Self {
        Self {
            ctx,
            pd: PamData::new(cmd, request),
            domain: None,
            check_provider: false,
            retained: None,
        }
    }

    pub async fn run(mut self) -> PamData {
        let mut step = match self.forward() {
            Ok(step) => step,
            Err(e) => self.fail(e),
        };

        loop {
            step = match step {
                Step::Reply => break,
                current => match self.advance(current).await {
                    Ok(next) => next,
                    Err(e) => self.fail(e),
                },
            };
        }

        self.finish().await;
        self.pd
    }

    fn fail(&mut self, err: PamError) -> Step {
        warn!(
            command = %self.pd.cmd,
            user = %self.pd.request.user,
            error = %err,
            "PAM request failed"
        );
        self.pd.status = err.status();
        Step::Reply
    }

    fn current_domain(&self) -> Result<&'a DomainInfo, PamError> {
        let ctx = self.ctx;
        self.domain
            .and_then(|index| ctx.domains.get(index))
            .ok_or_else(|| PamError::UserUnknown(self.pd.request.user.clone()))
    }

    fn forward(&mut self) -> Result<Step, PamError> {
        let index = self
            .ctx
            .domains
            .resolve(self.pd.request.domain.as_deref(), &self.pd.request.user)?;
        self.domain = Some(index);
        Ok(Step::Route)
    }

    async fn advance(&mut self, step: Step) -> Result<Step, PamError> {
        match step {
            Step::Route => self.route(),
            Step::CheckCache => {
                let domain = self.current_domain()?;
                let records = self
                    .ctx
                    .cache
                    .get_user(&domain.name, &self.pd.request.user)
                    .await?;
                Ok(Step::Evaluate(records))
            }
            Step::Evaluate(records) => self.evaluate(records),
            Step::QueryProvider => self.query_provider().await,
            Step::Dispatch(record) => {
                self.dispatch(record).await?;
                Ok(Step::Reply)
            }
            Step::Reply => Ok(Step::Reply),
        }
    }

    /// Authentication never trusts the cache while a backend may answer.
    fn route(&mut self) -> Result<Step, PamError> {
        let domain = self.current_domain()?;
        if domain.provider_kind() == ProviderKind::None {
            return Err(PamError::NoProvider(domain.name.clone()));
        }

        let needs_check = domain.needs_provider_check();
        if needs_check && matches!(self.pd.cmd, PamCommand::Authenticate | PamCommand::SetCred) {
            self.check_provider = false;
            Ok(Step::QueryProvider)
        } else {
            self.check_provider = needs_check;
            Ok(Step::CheckCache)
        }
    }

    fn evaluate(&mut self, records: Vec<UserRecord>) -> Result<Step, PamError> {
        let now = chrono::Utc::now().timestamp();
        let decision = freshness::evaluate(
            &self.pd.request.user,
            records,
            self.check_provider,
            now,
            self.ctx.cache_timeout_secs,
        )?;

        match decision {
            GateDecision::QueryProvider { retained } => {
                if retained.is_some() {
                    self.retained = retained;
                }
                Ok(Step::QueryProvider)
            }
            GateDecision::NotFound => self.next_domain(),
            GateDecision::UseCached(record) => Ok(Step::Dispatch(record)),
        }
    }

    async fn query_provider(&mut self) -> Result<Step, PamError> {
        self.check_provider = false;

        let domain = self.current_domain()?;
        let conn = self.ctx.backends.get(&domain.name)?;
        let reply =
            send_account_request(&conn, &self.pd.request.user, self.ctx.backend_timeout).await?;

        match check_dp_reply(reply)? {
            DpErrorMajor::Offline => {
                info!(domain = %domain.name, user = %self.pd.request.user, "Backend offline, falling back to the retained record");
                let records = self.retained.take().into_iter().collect();
                Ok(Step::Evaluate(records))
            }
            _ => Ok(Step::CheckCache),
        }
    }

    /// Move on to the next domain that accepts short names.
    fn next_domain(&mut self) -> Result<Step, PamError> {
        let user = self.pd.request.user.clone();
        if self.pd.request.domain.is_some() {
            return Err(PamError::UserUnknown(user));
        }

        let start = self.domain.map(|index| index + 1).unwrap_or(0);
        let next = self
            .ctx
            .domains
            .first_eligible_from(start)
            .ok_or_else(|| PamError::UserUnknown(user.clone()))?;

        self.domain = Some(next);
        self.retained = None;
        debug!(user = %user, domain = ?self.ctx.domains.get(next).map(|d| &d.name), "Trying next domain");
        Ok(Step::Route)
    }

    async fn dispatch(&mut self, record: UserRecord) -> Result<(), PamError> {
        let domain = self.current_domain()?;
        let user = self.pd.request.user.clone();

        self.pd.uid = Some(record.uid.ok_or_else(|| PamError::MissingId {
            user: user.clone(),
            field: "uid",
        })?);
        self.pd.gid = Some(record.gid.ok_or_else(|| PamError::MissingId {
            user: user.clone(),
            field: "gid",
        })?);

        if self.pd.request.domain.is_none() {
            self.pd.request.domain = Some(domain.name.clone());
        }

        match domain.provider_kind() {
            ProviderKind::Local => local_pam_handler(self.ctx, domain, &mut self.pd).await,
            ProviderKind::Remote(_) => {
                let conn = self.ctx.backends.get(&domain.name)?;
                let reply = send_pam_request(&conn, &self.pd, self.ctx.backend_timeout).await?;
                debug!(user = %user, pam_status = reply.pam_status, domain = %reply.domain, "Backend answered");
                self.pd.status = PamStatus::from(reply.pam_status);
                if !reply.domain.is_empty() {
                    self.pd.request.domain = Some(reply.domain);
                }
                Ok(())
            }
            ProviderKind::None => Err(PamError::NoProvider(domain.name.clone())),
        }
    }

    /// Post-processing shared by every outcome, then the domain item.
    async fn finish(&mut self) {
        let ctx = self.ctx;
        if let Some(domain) = self.domain.and_then(|index| ctx.domains.get(index)) {
            if self.pd.cmd == PamCommand::Authenticate
                && domain.cache_credentials
                && !self.pd.offline_auth
            {
                if self.pd.status == PamStatus::AuthInfoUnavail {
                    self.pd.offline_auth = true;
                    cache_auth(self.ctx, domain, &mut self.pd).await;
                } else if self.pd.status == PamStatus::Success {
                    self.store_credentials(domain).await;
                }
            }
        }

        if matches!(
            self.pd.cmd,
            PamCommand::SetCred
                | PamCommand::AcctMgmt
                | PamCommand::OpenSession
                | PamCommand::CloseSession
        ) && self.pd.status == PamStatus::AuthInfoUnavail
        {
            debug!(command = %self.pd.cmd, "Assuming offline authentication, reporting success");
            self.pd.status = PamStatus::Success;
        }

        if self.pd.response_delay > 0 {
            let delay = std::mem::take(&mut self.pd.response_delay);
            debug!(delay_secs = delay, "Delaying reply");
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        if let Some(name) = &self.pd.request.domain {
            self.pd.responses.append_cstr(PAM_DOMAIN_NAME, name);
        }
    }

    async fn store_credentials(&self, domain: &DomainInfo) {
        let token = &self.pd.request.authtok;
        if !domain.needs_provider_check() || token.kind != AuthTokType::Password || token.is_empty()
        {
            return;
        }
        let ctx = self.ctx;
        if let Err(e) = ctx
            .cache
            .store_credentials(&domain.name, &self.pd.request.user, &token.data)
            .await
        {
            warn!(user = %self.pd.request.user, domain = %domain.name, error = %e, "Failed to cache credentials");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AuthTok;
    use broker_core::cache::MemoryCache;

    fn context(domains: Vec<DomainInfo>, cache: Arc<MemoryCache>) -> ResponderContext {
        ResponderContext {
            domains: DomainList::new(domains),
            names: NameParser::default(),
            cache,
            backends: BackendLinks::new(),
            backend_timeout: Duration::from_millis(200),
            cache_timeout_secs: 30,
            failed_login_delay_secs: 0,
        }
    }

    fn request(user: &str, domain: Option<&str>, password: &'static [u8]) -> PamRequest {
        PamRequest {
            user: user.to_string(),
            domain: domain.map(str::to_string),
            authtok: AuthTok::password(password),
            ..Default::default()
        }
    }

    fn domain_item(pd: &PamData) -> Option<Vec<u8>> {
        pd.responses
            .iter()
            .find(|item| item.kind == PAM_DOMAIN_NAME)
            .map(|item| item.data.to_vec())
    }

    #[tokio::test]
    async fn test_unknown_explicit_domain() {
        let ctx = context(vec![DomainInfo::local("LOCAL")], Arc::new(MemoryCache::new()));
        let pd = PamSession::new(&ctx, PamCommand::AcctMgmt, request("alice", Some("NOPE"), b""))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::UserUnknown);
        assert_eq!(domain_item(&pd), Some(b"NOPE\0".to_vec()));
    }

    #[tokio::test]
    async fn test_domain_without_provider_is_system_error() {
        let bare = DomainInfo {
            provider: None,
            ..DomainInfo::local("BARE")
        };
        let ctx = context(vec![bare], Arc::new(MemoryCache::new()));
        let pd = PamSession::new(&ctx, PamCommand::AcctMgmt, request("alice", None, b""))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::SystemErr);
    }

    #[tokio::test]
    async fn test_local_hit_appends_domain() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store_user("LOCAL", UserRecord::new("alice", 1000, 100))
            .await
            .unwrap();
        let ctx = context(vec![DomainInfo::local("LOCAL")], cache);

        let pd = PamSession::new(&ctx, PamCommand::OpenSession, request("alice", None, b""))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::Success);
        assert_eq!((pd.uid, pd.gid), (Some(1000), Some(100)));
        assert_eq!(domain_item(&pd), Some(b"LOCAL\0".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_gid_is_system_error() {
        let cache = Arc::new(MemoryCache::new());
        let mut record = UserRecord::new("alice", 1000, 100);
        record.gid = None;
        cache.store_user("LOCAL", record).await.unwrap();
        let ctx = context(vec![DomainInfo::local("LOCAL")], cache);

        let pd = PamSession::new(&ctx, PamCommand::AcctMgmt, request("alice", None, b""))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::SystemErr);
    }

    #[tokio::test]
    async fn test_walks_short_name_domains_in_order() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store_user("C", UserRecord::new("alice", 1000, 1000))
            .await
            .unwrap();
        let fq = DomainInfo {
            fqnames: true,
            ..DomainInfo::local("A")
        };
        let ctx = context(
            vec![fq, DomainInfo::local("B"), DomainInfo::local("C")],
            cache,
        );

        let found = PamSession::new(&ctx, PamCommand::AcctMgmt, request("alice", None, b""))
            .run()
            .await;
        assert_eq!(found.status, PamStatus::Success);
        assert_eq!(domain_item(&found), Some(b"C\0".to_vec()));

        let missing = PamSession::new(&ctx, PamCommand::AcctMgmt, request("bob", None, b""))
            .run()
            .await;
        assert_eq!(missing.status, PamStatus::UserUnknown);
        assert_eq!(domain_item(&missing), None);
    }

    #[tokio::test]
    async fn test_remote_domain_without_link_is_system_error() {
        let ctx = context(
            vec![DomainInfo::remote("CORP", "static", None)],
            Arc::new(MemoryCache::new()),
        );
        let pd = PamSession::new(&ctx, PamCommand::Authenticate, request("alice", None, b"pw"))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::SystemErr);
    }

    #[tokio::test]
    async fn test_response_delay_fires_once() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .store_user("LOCAL", UserRecord::new("alice", 1000, 1000))
            .await
            .unwrap();
        cache.set_password("LOCAL", "alice", b"right").await.unwrap();
        let mut ctx = context(vec![DomainInfo::local("LOCAL")], cache);
        ctx.failed_login_delay_secs = 1;

        let started = tokio::time::Instant::now();
        let pd = PamSession::new(&ctx, PamCommand::Authenticate, request("alice", None, b"wrong"))
            .run()
            .await;
        assert_eq!(pd.status, PamStatus::AuthErr);
        assert_eq!(pd.response_delay, 0);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_malformed_body_is_system_error() {
        let ctx = context(vec![DomainInfo::local("LOCAL")], Arc::new(MemoryCache::new()));
        let pd = process(
            &ctx,
            PamCommand::Authenticate,
            2,
            &Bytes::from_static(b"garbage"),
        )
        .await;
        assert_eq!(pd.status, PamStatus::SystemErr);
        assert!(pd.responses.is_empty());
    }
}
