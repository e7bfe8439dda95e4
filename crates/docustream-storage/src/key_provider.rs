use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use docustream_core::{KeyError, MasterPublicKey, SecureKeyProvider, Validity};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::sealing;

/// A master pair as held inside a provider.
struct MasterPair {
    secret: StaticSecret,
    public: PublicKey,
    validity: Validity,
}

impl MasterPair {
    fn generate(lifetime: Duration) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            validity: Validity::starting_now(lifetime),
        }
    }

    fn public_key(&self, alias: &str) -> Result<MasterPublicKey, KeyError> {
        self.validity.check(alias, Utc::now())?;
        Ok(MasterPublicKey::from_bytes(self.public.to_bytes()))
    }

    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<String, KeyError> {
        self.validity.check(alias, Utc::now())?;
        sealing::seal(&self.public, plaintext)
    }

    fn unwrap(&self, alias: &str, wrapped: &str) -> Result<Vec<u8>, KeyError> {
        self.validity.check(alias, Utc::now())?;
        sealing::open(&self.secret, wrapped)
    }

    fn to_stored(&self) -> StoredPair {
        StoredPair {
            secret: STANDARD.encode(self.secret.to_bytes()),
            validity: self.validity,
        }
    }
}

/// Serialized form of a master pair inside a keystore entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPair {
    secret: String,
    validity: Validity,
}

impl StoredPair {
    fn into_pair(self) -> Result<MasterPair, KeyError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(self.secret.as_bytes())
                .map_err(|e| KeyError::Decode(e.to_string()))?,
        );
        if bytes.len() != 32 {
            return Err(KeyError::Decode(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut raw = Zeroizing::new([0u8; 32]);
        raw.copy_from_slice(&bytes);
        let secret = StaticSecret::from(*raw);
        let public = PublicKey::from(&secret);
        Ok(MasterPair {
            secret,
            public,
            validity: self.validity,
        })
    }
}

fn missing(alias: &str) -> KeyError {
    KeyError::MissingKeyPair {
        alias: alias.to_string(),
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> KeyError {
    KeyError::Keystore(format!("lock poisoned: {err}"))
}

/// In-memory keystore for tests and ephemeral sessions. Clones share state,
/// which stands in for a keystore that outlives a process restart.
#[derive(Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<HashMap<String, MasterPair>>>,
    lifetime: Duration,
}

impl Default for InMemoryKeyProvider {
    fn default() -> Self {
        Self::with_lifetime(Validity::default_lifetime())
    }
}

impl InMemoryKeyProvider {
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            lifetime,
        }
    }

    fn with_pair<R>(
        &self,
        alias: &str,
        f: impl FnOnce(&MasterPair) -> Result<R, KeyError>,
    ) -> Result<R, KeyError> {
        let guard = self.inner.lock().map_err(poisoned)?;
        let pair = guard.get(alias).ok_or_else(|| missing(alias))?;
        f(pair)
    }
}

impl SecureKeyProvider for InMemoryKeyProvider {
    fn ensure_key_pair(&self, alias: &str) -> Result<(), KeyError> {
        let mut guard = self.inner.lock().map_err(poisoned)?;
        if !guard.contains_key(alias) {
            info!(alias, "generating master pair");
            guard.insert(alias.to_string(), MasterPair::generate(self.lifetime));
        }
        Ok(())
    }

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyError> {
        let guard = self.inner.lock().map_err(poisoned)?;
        Ok(guard.contains_key(alias))
    }

    fn public_key(&self, alias: &str) -> Result<MasterPublicKey, KeyError> {
        self.with_pair(alias, |pair| pair.public_key(alias))
    }

    fn wrap(&self, plaintext: &[u8], alias: &str) -> Result<String, KeyError> {
        self.with_pair(alias, |pair| pair.wrap(alias, plaintext))
    }

    fn unwrap(&self, wrapped: &str, alias: &str) -> Result<Vec<u8>, KeyError> {
        self.with_pair(alias, |pair| pair.unwrap(alias, wrapped))
    }

    fn delete_all(&self) -> Result<usize, KeyError> {
        let mut guard = self.inner.lock().map_err(poisoned)?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }
}

/// Software keystore: master pairs in a single owner-only JSON file. For hosts
/// without an OS keychain.
pub struct FileKeyProvider {
    path: PathBuf,
    lifetime: Duration,
    lock: Mutex<()>,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_lifetime(path, Validity::default_lifetime())
    }

    pub fn with_lifetime(path: impl Into<PathBuf>, lifetime: Duration) -> Self {
        Self {
            path: path.into(),
            lifetime,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, StoredPair>, KeyError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| KeyError::Keystore(e.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(KeyError::Keystore(err.to_string())),
        }
    }

    fn save(&self, entries: &BTreeMap<String, StoredPair>) -> Result<(), KeyError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| KeyError::Keystore("invalid keystore path".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| KeyError::Keystore(e.to_string()))?;

        // NamedTempFile is created owner-only.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| KeyError::Keystore(e.to_string()))?;
        let json = serde_json::to_vec(entries).map_err(|e| KeyError::Keystore(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| KeyError::Keystore(e.to_string()))?;
        tmp.flush().map_err(|e| KeyError::Keystore(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| KeyError::Keystore(e.error.to_string()))?;
        Ok(())
    }

    fn with_pair<R>(
        &self,
        alias: &str,
        f: impl FnOnce(&MasterPair) -> Result<R, KeyError>,
    ) -> Result<R, KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let stored = self.load()?.remove(alias).ok_or_else(|| missing(alias))?;
        f(&stored.into_pair()?)
    }
}

impl SecureKeyProvider for FileKeyProvider {
    #[instrument(skip(self))]
    fn ensure_key_pair(&self, alias: &str) -> Result<(), KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let mut entries = self.load()?;
        if entries.contains_key(alias) {
            return Ok(());
        }
        info!("generating master pair");
        entries.insert(
            alias.to_string(),
            MasterPair::generate(self.lifetime).to_stored(),
        );
        self.save(&entries)
    }

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        Ok(self.load()?.contains_key(alias))
    }

    fn public_key(&self, alias: &str) -> Result<MasterPublicKey, KeyError> {
        self.with_pair(alias, |pair| pair.public_key(alias))
    }

    fn wrap(&self, plaintext: &[u8], alias: &str) -> Result<String, KeyError> {
        self.with_pair(alias, |pair| pair.wrap(alias, plaintext))
    }

    fn unwrap(&self, wrapped: &str, alias: &str) -> Result<Vec<u8>, KeyError> {
        self.with_pair(alias, |pair| pair.unwrap(alias, wrapped))
    }

    fn delete_all(&self) -> Result<usize, KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let removed = self.load()?.len();
        match fs::remove_file(&self.path) {
            Ok(_) => Ok(removed),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(removed),
            Err(err) => Err(KeyError::Keystore(err.to_string())),
        }
    }
}

const ALIAS_INDEX: &str = "docustream.aliases";

/// OS keyring-backed provider. Each alias is one keyring entry; an index entry
/// lists the aliases so `delete_all` can enumerate them.
pub struct KeyringProvider {
    service: String,
    lifetime: Duration,
    lock: Mutex<()>,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            lifetime: Validity::default_lifetime(),
            lock: Mutex::new(()),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, KeyError> {
        keyring::Entry::new(&self.service, account).map_err(|e| KeyError::Keystore(e.to_string()))
    }

    fn read(&self, account: &str) -> Result<Option<String>, KeyError> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyError::Keystore(err.to_string())),
        }
    }

    fn aliases(&self) -> Result<Vec<String>, KeyError> {
        match self.read(ALIAS_INDEX)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| KeyError::Keystore(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    fn write_aliases(&self, aliases: &[String]) -> Result<(), KeyError> {
        let json = serde_json::to_string(aliases).map_err(|e| KeyError::Keystore(e.to_string()))?;
        self.entry(ALIAS_INDEX)?
            .set_password(&json)
            .map_err(|e| KeyError::Keystore(e.to_string()))
    }

    fn load_pair(&self, alias: &str) -> Result<MasterPair, KeyError> {
        let json = self.read(alias)?.ok_or_else(|| missing(alias))?;
        let stored: StoredPair =
            serde_json::from_str(&json).map_err(|e| KeyError::Decode(e.to_string()))?;
        stored.into_pair()
    }
}

impl SecureKeyProvider for KeyringProvider {
    #[instrument(skip(self), fields(service = %self.service))]
    fn ensure_key_pair(&self, alias: &str) -> Result<(), KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        if self.read(alias)?.is_some() {
            return Ok(());
        }

        info!("generating master pair");
        let stored = MasterPair::generate(self.lifetime).to_stored();
        let json = serde_json::to_string(&stored).map_err(|e| KeyError::Keystore(e.to_string()))?;
        self.entry(alias)?
            .set_password(&json)
            .map_err(|e| KeyError::Keystore(e.to_string()))?;
        // A backend that drops entries between handles would only surface
        // later as a missing pair.
        if self.read(alias)?.is_none() {
            return Err(KeyError::Keystore(format!(
                "keyring backend did not keep the entry for {alias}"
            )));
        }

        let mut aliases = self.aliases()?;
        if !aliases.iter().any(|a| a == alias) {
            aliases.push(alias.to_string());
            self.write_aliases(&aliases)?;
        }
        Ok(())
    }

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyError> {
        Ok(self.read(alias)?.is_some())
    }

    fn public_key(&self, alias: &str) -> Result<MasterPublicKey, KeyError> {
        self.load_pair(alias)?.public_key(alias)
    }

    fn wrap(&self, plaintext: &[u8], alias: &str) -> Result<String, KeyError> {
        self.load_pair(alias)?.wrap(alias, plaintext)
    }

    fn unwrap(&self, wrapped: &str, alias: &str) -> Result<Vec<u8>, KeyError> {
        self.load_pair(alias)?.unwrap(alias, wrapped)
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn delete_all(&self) -> Result<usize, KeyError> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let mut removed = 0;
        for alias in self.aliases()? {
            warn!(%alias, "removing alias from keyring");
            match self.entry(&alias)?.delete_credential() {
                Ok(()) => removed += 1,
                Err(keyring::Error::NoEntry) => {}
                Err(err) => return Err(KeyError::Keystore(err.to_string())),
            }
        }
        match self.entry(ALIAS_INDEX)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(removed),
            Err(err) => Err(KeyError::Keystore(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use docustream_core::MASTER_ALIAS;
    use rand::RngCore;

    use super::*;

    #[test]
    fn keyring_pair_is_usable_right_after_ensure() {
        let provider = KeyringProvider::new(format!("docustream-test-{}", OsRng.next_u64()));
        match provider.ensure_key_pair(MASTER_ALIAS) {
            Ok(()) => {
                assert!(provider.contains_alias(MASTER_ALIAS).unwrap());
                let wrapped = provider
                    .wrap(b"secret", MASTER_ALIAS)
                    .expect("pair must be readable after ensure");
                assert_eq!(provider.unwrap(&wrapped, MASTER_ALIAS).unwrap(), b"secret");
                assert_eq!(provider.delete_all().unwrap(), 1);
            }
            // No usable OS keychain on this host: refused up front.
            Err(err) => assert!(matches!(err, KeyError::Keystore(_)), "{err:?}"),
        }
    }

    #[test]
    fn memory_provider_keeps_one_pair_per_alias() {
        let provider = InMemoryKeyProvider::default();
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();
        let first = provider.public_key(MASTER_ALIAS).unwrap();
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();
        let second = provider.public_key(MASTER_ALIAS).unwrap();

        assert_eq!(first, second);
        assert!(provider.contains_alias(MASTER_ALIAS).unwrap());
    }

    #[test]
    fn wrap_round_trips_through_clones() {
        let provider = InMemoryKeyProvider::default();
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();
        let wrapped = provider.wrap(b"1234567890", MASTER_ALIAS).unwrap();

        let restarted = provider.clone();
        assert_eq!(
            restarted.unwrap(&wrapped, MASTER_ALIAS).unwrap(),
            b"1234567890"
        );
    }

    #[test]
    fn missing_alias_is_reported() {
        let provider = InMemoryKeyProvider::default();
        let err = provider.wrap(b"x", "nope").expect_err("no pair yet");
        assert_eq!(
            err,
            KeyError::MissingKeyPair {
                alias: "nope".into()
            }
        );
    }

    #[test]
    fn delete_all_counts_aliases() {
        let provider = InMemoryKeyProvider::default();
        provider.ensure_key_pair("a").unwrap();
        provider.ensure_key_pair("b").unwrap();
        assert_eq!(provider.delete_all().unwrap(), 2);
        assert_eq!(provider.delete_all().unwrap(), 0);
        assert!(!provider.contains_alias("a").unwrap());
    }

    #[test]
    fn expired_pair_fails_loudly() {
        let provider = InMemoryKeyProvider::with_lifetime(Duration::seconds(-1));
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();
        let err = provider.wrap(b"x", MASTER_ALIAS).expect_err("expired");
        assert!(matches!(err, KeyError::Expired { .. }));
    }

    #[test]
    fn file_provider_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keystore.json");

        let provider = FileKeyProvider::new(&path);
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();
        let wrapped = provider.wrap(b"secret", MASTER_ALIAS).unwrap();
        let public = provider.public_key(MASTER_ALIAS).unwrap();

        let reopened = FileKeyProvider::new(&path);
        assert_eq!(reopened.public_key(MASTER_ALIAS).unwrap(), public);
        assert_eq!(reopened.unwrap(&wrapped, MASTER_ALIAS).unwrap(), b"secret");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0, "keystore must be owner-only");
        }
    }

    #[test]
    fn file_provider_delete_all_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = FileKeyProvider::new(dir.path().join("keystore.json"));
        provider.ensure_key_pair(MASTER_ALIAS).unwrap();

        assert_eq!(provider.delete_all().unwrap(), 1);
        assert!(!provider.path().exists());
        assert!(!provider.contains_alias(MASTER_ALIAS).unwrap());
        assert_eq!(provider.delete_all().unwrap(), 0);
    }
}
