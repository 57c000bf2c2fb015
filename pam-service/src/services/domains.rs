use serde::Deserialize;
use std::path::PathBuf;

use crate::error::PamError;

pub const LOCAL_PROVIDER: &str = "local";

/// How a domain answers PAM requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    None,
    Local,
    Remote(String),
}

/// A configured identity domain.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainInfo {
    pub name: String,
    /// Users of this domain must always be written `user@domain`.
    #[serde(default)]
    pub fqnames: bool,
    #[serde(default)]
    pub cache_credentials: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub backend_socket: Option<PathBuf>,
}

impl DomainInfo {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fqnames: false,
            cache_credentials: false,
            provider: Some(LOCAL_PROVIDER.to_string()),
            backend_socket: None,
        }
    }

    pub fn remote(
        name: impl Into<String>,
        provider: impl Into<String>,
        backend_socket: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            fqnames: false,
            cache_credentials: false,
            provider: Some(provider.into()),
            backend_socket,
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        match self.provider.as_deref() {
            None => ProviderKind::None,
            Some(LOCAL_PROVIDER) => ProviderKind::Local,
            Some(other) => ProviderKind::Remote(other.to_string()),
        }
    }

    /// Whether cached data must be revalidated with a backend.
    pub fn needs_provider_check(&self) -> bool {
        matches!(self.provider_kind(), ProviderKind::Remote(_))
    }
}

/// The configured domains, in lookup order.
#[derive(Debug, Clone, Default)]
pub struct DomainList {
    domains: Vec<DomainInfo>,
}

impl DomainList {
    pub fn new(domains: Vec<DomainInfo>) -> Self {
        Self { domains }
    }

    pub fn get(&self, index: usize) -> Option<&DomainInfo> {
        self.domains.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainInfo> {
        self.domains.iter()
    }

    /// Case-insensitive lookup; the first match wins.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.domains
            .iter()
            .position(|domain| domain.name.eq_ignore_ascii_case(name))
    }

    /// The first domain at or after `start` that accepts short names.
    pub fn first_eligible_from(&self, start: usize) -> Option<usize> {
        self.domains
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, domain)| !domain.fqnames)
            .map(|(index, _)| index)
    }

    /// Pick the starting domain for a request.
    pub fn resolve(&self, hint: Option<&str>, user: &str) -> Result<usize, PamError> {
        match hint {
            Some(name) => self
                .find(name)
                .ok_or_else(|| PamError::DomainNotFound(name.to_string())),
            None => self
                .first_eligible_from(0)
                .ok_or_else(|| PamError::UserUnknown(user.to_string())),
        }
    }
}
