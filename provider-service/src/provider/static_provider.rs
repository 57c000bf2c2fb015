//! A provider whose users come straight from configuration.

use async_trait::async_trait;
use broker_core::bus::PamHandlerArgs;
use broker_core::cache::{IdentityCache, UserRecord};
use broker_core::pam::{PamCommand, PamStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use super::{AccountRequest, EntryType, Filter, Provider, ProviderError};
use crate::config::{StaticProviderConfig, StaticUser};

pub const STATIC_PROVIDER: &str = "static";

pub struct StaticProvider {
    domain: String,
    online: AtomicBool,
    users: Vec<StaticUser>,
    cache: Arc<dyn IdentityCache>,
}

impl StaticProvider {
    pub fn new(domain: impl Into<String>, config: &StaticProviderConfig, cache: Arc<dyn IdentityCache>) -> Self {
        Self {
            domain: domain.into(),
            online: AtomicBool::new(config.online),
            users: config.users.clone(),
            cache,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), ProviderError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Offline)
        }
    }

    fn find(&self, filter: &Filter) -> Option<&StaticUser> {
        self.users.iter().find(|user| match filter {
            Filter::Name(name) => &user.name == name,
            Filter::IdNumber(uid) => user.uid == *uid,
        })
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        STATIC_PROVIDER
    }

    async fn check_online(&self) -> Result<bool, ProviderError> {
        Ok(self.online.load(Ordering::SeqCst))
    }

    async fn get_account_info(&self, request: &AccountRequest) -> Result<(), ProviderError> {
        self.ensure_online()?;

        if request.entry_type == EntryType::Group {
            return Err(ProviderError::NotFound("static provider has no groups".to_string()));
        }

        let user = self
            .find(&request.filter)
            .ok_or_else(|| ProviderError::NotFound(format!("{:?}", request.filter)))?;

        self.cache
            .store_user(&self.domain, UserRecord::new(&user.name, user.uid, user.gid))
            .await?;
        debug!(user = %user.name, domain = %self.domain, "Cache entry refreshed");
        Ok(())
    }

    async fn pam_handler(&self, request: &PamHandlerArgs) -> Result<PamStatus, ProviderError> {
        self.ensure_online()?;

        let Some(user) = self.find(&Filter::Name(request.user.clone())) else {
            return Ok(PamStatus::UserUnknown);
        };

        let status = match request.cmd {
            PamCommand::Authenticate => {
                let matches: bool = user.password.as_bytes().ct_eq(&request.authtok).into();
                if matches {
                    PamStatus::Success
                } else {
                    info!(user = %user.name, domain = %self.domain, "Authentication failed");
                    PamStatus::AuthErr
                }
            }
            // Passwords live in configuration and cannot be changed from here.
            PamCommand::ChAuthTok => PamStatus::PermDenied,
            PamCommand::SetCred
            | PamCommand::AcctMgmt
            | PamCommand::OpenSession
            | PamCommand::CloseSession => PamStatus::Success,
        };
        Ok(status)
    }
}
