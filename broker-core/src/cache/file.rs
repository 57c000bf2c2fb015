use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheEntry, CacheError, Credential, IdentityCache, UserRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    domains: BTreeMap<String, Vec<CacheEntry>>,
}

impl CacheFile {
    fn find_mut(&mut self, domain: &str, name: &str) -> Option<&mut CacheEntry> {
        self.domains
            .get_mut(domain)?
            .iter_mut()
            .find(|entry| entry.record.name == name)
    }
}

/// Cache persisted as one JSON document.
///
/// The file is re-read on every access so records written by another process
/// are seen immediately. Writes go to a temporary file that is renamed over
/// the original. Every read-modify-write holds an exclusive `flock` on a
/// sibling `.lock` file, so the responder and the backends can share one path.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<CacheFile, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(CacheFile::default()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CacheFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, file: &CacheFile) -> Result<(), CacheError> {
        let data = serde_json::to_vec_pretty(file)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CacheError::Storage(format!("invalid cache path {:?}", self.path)))?;
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = data.len(), "Cache file written");
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Exclusive lock across processes. Released when the returned file is dropped.
    async fn lock_file(&self) -> Result<File, CacheError> {
        let path = self.lock_path();
        tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| CacheError::Storage(format!("cache lock task failed: {}", e)))?
        .map_err(CacheError::from)
    }

    async fn update<F>(&self, mutate: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut CacheFile) -> Result<(), CacheError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let lock = self.lock_file().await?;
        let mut file = self.load().await?;
        mutate(&mut file)?;
        let result = self.save(&file).await;
        if let Err(e) = FileExt::unlock(&lock) {
            debug!(path = %self.path.display(), error = %e, "Cache unlock failed, closing instead");
        }
        result
    }

    async fn put_credential(
        &self,
        domain: &str,
        name: &str,
        credential: Credential,
    ) -> Result<(), CacheError> {
        self.update(|file| {
            let entry = file
                .find_mut(domain, name)
                .ok_or_else(|| CacheError::NotFound(format!("{}@{}", name, domain)))?;
            entry.credential = Some(credential);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl IdentityCache for JsonFileCache {
    async fn get_user(&self, domain: &str, name: &str) -> Result<Vec<UserRecord>, CacheError> {
        let file = self.load().await?;
        Ok(file
            .domains
            .get(domain)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.record.name == name)
                    .map(|entry| entry.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn store_user(&self, domain: &str, record: UserRecord) -> Result<(), CacheError> {
        self.update(|file| {
            match file.find_mut(domain, &record.name) {
                Some(entry) => entry.record = record,
                None => file
                    .domains
                    .entry(domain.to_string())
                    .or_default()
                    .push(CacheEntry {
                        record,
                        credential: None,
                    }),
            }
            Ok(())
        })
        .await
    }

    async fn store_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<(), CacheError> {
        self.put_credential(domain, name, Credential::new(token, true))
            .await
    }

    async fn verify_credentials(
        &self,
        domain: &str,
        name: &str,
        token: &[u8],
    ) -> Result<bool, CacheError> {
        let mut file = self.load().await?;
        let credential = file
            .find_mut(domain, name)
            .ok_or_else(|| CacheError::NotFound(format!("{}@{}", name, domain)))?
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
            .await
    }
}
