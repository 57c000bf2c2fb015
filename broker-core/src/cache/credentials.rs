use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;

/// Salted SHA-256 digest of a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    salt: String,
    digest: String,
    /// True when the digest was learned from a successful online login rather
    /// than set locally.
    #[serde(default)]
    pub cached: bool,
    pub updated_at: i64,
}

impl Credential {
    pub fn new(token: &[u8], cached: bool) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            salt: hex::encode(salt),
            digest: hex::encode(digest(&salt, token)),
            cached,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Constant-time comparison against `token`. A corrupt entry never matches.
    pub fn matches(&self, token: &[u8]) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.digest)) else {
            return false;
        };
        let actual = digest(&salt, token);
        actual.ct_eq(expected.as_slice()).into()
    }
}

fn digest(salt: &[u8], token: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(token);
    hasher.finalize().to_vec()
}
