use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheEntry, CacheError, Credential, IdentityCache, UserRecord};

/// Process-local cache keyed by `(domain, name)`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(String, String), CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(domain: &str, name: &str) -> (String, String) {
        (domain.to_string(), name.to_string())
    }

    fn put_credential(&self, domain: &str, name: &str, credential: Credential) -> Result<(), CacheError> {
        let mut entry = self
            .entries
            .get_mut(&Self::key(domain, name))
            .ok_or_else(|| CacheError::NotFound(format!("{}@{}", name, domain)))?;
        entry.credential = Some(credential);
        Ok(())
    }
}

#[async_trait]
impl IdentityCache for MemoryCache {
    async fn get_user(&self, domain: &str, name: &str) -> Result<Vec<UserRecord>, CacheError> {
        Ok(self
            .entries
            .get(&Self::key(domain, name))
            .map(|entry| vec![entry.record.clone()])
            .unwrap_or_default())
    }

    async fn store_user(&self, domain: &str, record: UserRecord) -> Result<(), CacheError> {
        let key = Self::key(domain, &record.name);
        match self.entries.get_mut(&key) {
            Some(mut entry) => entry.record = record,
            None => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        record,
                        credential: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn store_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<(), CacheError> {
        self.put_credential(domain, name, Credential::new(token, true))
    }

    async fn verify_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<bool, CacheError> {
        let entry = self
            .entries
            .get(&Self::key(domain, name))
            .ok_or_else(|| CacheError::NotFound(format!("{}@{}", name, domain)))?;
        let credential = entry
            .credential
            .as_ref()
            .ok_or_else(|| CacheError::NotFound(format!("no credentials for {}@{}", name, domain)))?;
        Ok(credential.matches(token))
    }

    async fn set_password(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<(), CacheError> {
        self.put_credential(domain, name, Credential::new(token, false))
    }
}
