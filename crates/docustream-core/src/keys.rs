use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Alias of the master pair used by the cipher.
pub const MASTER_ALIAS: &str = "MASTER_PAIR";

/// Size of a master public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Public half of a master pair. Safe to hand to third parties.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MasterPublicKey([u8; PUBLIC_KEY_SIZE]);

impl MasterPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MasterPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterPublicKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Validity window of a master pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Validity {
    /// Default lifetime of a freshly generated master pair.
    pub fn default_lifetime() -> Duration {
        Duration::days(365 * 2)
    }

    pub fn starting_now(lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            not_before: now,
            not_after: now + lifetime,
        }
    }

    pub fn check(&self, alias: &str, now: DateTime<Utc>) -> Result<(), KeyError> {
        if now < self.not_before {
            return Err(KeyError::NotYetValid {
                alias: alias.to_string(),
                not_before: self.not_before,
            });
        }
        if now > self.not_after {
            return Err(KeyError::Expired {
                alias: alias.to_string(),
                not_after: self.not_after,
            });
        }
        Ok(())
    }
}

/// Keystore holding alias-scoped asymmetric master pairs.
///
/// Private keys never leave the provider: `wrap` uses the public half and
/// `unwrap` is the only operation that touches the private half.
pub trait SecureKeyProvider: Send + Sync {
    /// Create the pair under `alias` unless one exists. Never regenerates.
    fn ensure_key_pair(&self, alias: &str) -> Result<(), KeyError>;

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyError>;

    fn public_key(&self, alias: &str) -> Result<MasterPublicKey, KeyError>;

    /// Seal `plaintext` to the pair's public key; returns base64 text.
    fn wrap(&self, plaintext: &[u8], alias: &str) -> Result<String, KeyError>;

    /// Open text produced by [`SecureKeyProvider::wrap`] for the same alias.
    fn unwrap(&self, wrapped: &str, alias: &str) -> Result<Vec<u8>, KeyError>;

    /// Remove every alias; returns how many were removed.
    fn delete_all(&self) -> Result<usize, KeyError>;
}
