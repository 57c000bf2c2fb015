//! Handlers that answer from the identity cache alone: domains served by the
//! `local` provider, and offline authentication against cached credentials.

use broker_core::cache::CacheError;
use broker_core::pam::{PamCommand, PamStatus};
use tracing::{debug, info, warn};

use crate::error::PamError;
use crate::services::domains::DomainInfo;
use crate::services::session::{PamData, ResponderContext};

/// Serve a request for a `local` domain.
pub async fn local_pam_handler(
    ctx: &ResponderContext,
    domain: &DomainInfo,
    pd: &mut PamData,
) -> Result<(), PamError> {
    let user = pd.request.user.clone();

    match pd.cmd {
        PamCommand::Authenticate => {
            let token = pd.request.authtok.data.clone();
            match ctx.cache.verify_credentials(&domain.name, &user, &token).await {
                Ok(true) => pd.status = PamStatus::Success,
                Ok(false) => {
                    info!(user = %user, domain = %domain.name, "Local authentication failed");
                    pd.status = PamStatus::AuthErr;
                    pd.response_delay = ctx.failed_login_delay_secs;
                }
                Err(CacheError::NotFound(_)) => pd.status = PamStatus::AuthInfoUnavail,
                Err(e) => return Err(e.into()),
            }
        }
        PamCommand::ChAuthTok => {
            let old = pd.request.authtok.data.clone();
            if !old.is_empty() {
                match ctx.cache.verify_credentials(&domain.name, &user, &old).await {
                    Ok(true) | Err(CacheError::NotFound(_)) => {}
                    Ok(false) => {
                        pd.status = PamStatus::AuthErr;
                        pd.response_delay = ctx.failed_login_delay_secs;
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let new = pd.request.newauthtok.data.clone();
            if new.is_empty() {
                pd.status = PamStatus::AuthTokErr;
                return Ok(());
            }
            ctx.cache.set_password(&domain.name, &user, &new).await?;
            debug!(user = %user, domain = %domain.name, "Local password changed");
            pd.status = PamStatus::Success;
        }
        PamCommand::SetCred
        | PamCommand::AcctMgmt
        | PamCommand::OpenSession
        | PamCommand::CloseSession => pd.status = PamStatus::Success,
    }
    Ok(())
}

/// Offline authentication against credentials cached from an earlier online
/// login. With nothing cached the status is left as it was.
pub async fn cache_auth(ctx: &ResponderContext, domain: &DomainInfo, pd: &mut PamData) {
    let user = pd.request.user.clone();
    let token = pd.request.authtok.data.clone();

    match ctx.cache.verify_credentials(&domain.name, &user, &token).await {
        Ok(true) => {
            info!(user = %user, domain = %domain.name, "Offline authentication succeeded");
            pd.status = PamStatus::Success;
        }
        Ok(false) => {
            info!(user = %user, domain = %domain.name, "Offline authentication failed");
            pd.status = PamStatus::AuthErr;
            pd.response_delay = ctx.failed_login_delay_secs;
        }
        Err(CacheError::NotFound(_)) => {
            debug!(user = %user, domain = %domain.name, "No cached credentials");
        }
        Err(e) => {
            warn!(user = %user, domain = %domain.name, error = %e, "Offline authentication unavailable");
        }
    }
}
