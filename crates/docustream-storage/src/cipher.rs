use std::sync::{Arc, Mutex, MutexGuard};

use docustream_core::{
    KeyError, MasterPublicKey, ResetOutcome, SecureKeyProvider, StoreContext, StoreError,
    MASTER_ALIAS,
};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    document::Document,
    key_material::KeyMaterial,
    symmetric::{random_iv, Iv, SymmetricCipher, SymmetricKey, IV_SIZE},
};

/// Envelope cipher for a document: a master pair in the keystore wraps a
/// data key and the last-used IV, both kept in an unencrypted key-material
/// document.
///
/// The data key is loaded on construction and dropped by [`Cipher::reset`];
/// the next operation after a reset initializes fresh key material.
pub struct Cipher {
    provider: Arc<dyn SecureKeyProvider>,
    alias: String,
    keys: Document<KeyMaterial>,
    state: Mutex<Option<SymmetricKey>>,
}

pub struct CipherBuilder {
    context: StoreContext,
    provider: Arc<dyn SecureKeyProvider>,
    alias: String,
    key_file_name: Option<String>,
}

impl CipherBuilder {
    /// Keystore alias of the master pair.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Name of the key-material file. Each encrypted document needs its own.
    pub fn key_file_name(mut self, name: impl Into<String>) -> Self {
        self.key_file_name = Some(name.into());
        self
    }

    /// Build and initialize: ensure the master pair, then create or restore
    /// the data key.
    pub fn build(self) -> Result<Cipher, StoreError> {
        self.context.require_application()?;

        let mut keys = Document::<KeyMaterial>::builder(&self.context);
        if let Some(name) = self.key_file_name {
            keys = keys.file_name(name);
        }

        let cipher = Cipher {
            provider: self.provider,
            alias: self.alias,
            keys: keys.build()?,
            state: Mutex::new(None),
        };
        {
            let mut state = cipher.lock()?;
            cipher.ready(&mut state)?;
        }
        Ok(cipher)
    }
}

impl Cipher {
    pub fn builder(context: &StoreContext, provider: Arc<dyn SecureKeyProvider>) -> CipherBuilder {
        CipherBuilder {
            context: context.clone(),
            provider,
            alias: MASTER_ALIAS.to_string(),
            key_file_name: None,
        }
    }

    pub fn new(
        context: &StoreContext,
        provider: Arc<dyn SecureKeyProvider>,
    ) -> Result<Self, StoreError> {
        Self::builder(context, provider).build()
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The unencrypted document holding the wrapped key material.
    pub fn key_document(&self) -> &Document<KeyMaterial> {
        &self.keys
    }

    /// Whether a data key is loaded.
    pub fn is_ready(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Public half of the master pair, for third parties sealing data to us.
    pub fn public_key(&self) -> Result<MasterPublicKey, StoreError> {
        Ok(self.provider.public_key(&self.alias)?)
    }

    /// Fresh random IV. Commit it with [`Cipher::remember_iv`] once the
    /// ciphertext produced with it is stored.
    pub fn generate_iv(&self) -> Iv {
        random_iv()
    }

    /// Commit `iv` as the one needed to read the stored document.
    ///
    /// Fails with [`StoreError::DuplicateIv`] if `iv` equals the committed one.
    #[instrument(skip_all, fields(alias = %self.alias))]
    pub fn remember_iv(&self, iv: &Iv) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let key = self.ready(&mut state)?;

        let mut material = self.keys.get()?;
        if material.wrapped_secret().is_none() {
            // Unreadable key file: keep the loaded data key rather than lose it.
            warn!("key material lost its data key; wrapping the loaded one again");
            material.secret = Some(self.provider.wrap(key.as_bytes(), &self.alias)?);
        }
        if let Some(previous) = self.unwrap_iv(&material)? {
            if previous == *iv {
                return Err(StoreError::DuplicateIv);
            }
        }

        material.vector = Some(self.provider.wrap(iv, &self.alias)?);
        self.keys.set(&material)?;
        debug!("committed new IV");
        Ok(())
    }

    pub fn encrypt(&self, plaintext: &str, iv: &Iv) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let key = self.ready(&mut state)?;
        SymmetricCipher::encrypt(key, iv, plaintext)
    }

    /// Decrypt with the committed IV.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let key = self.ready(&mut state)?;
        let iv = self.committed_iv()?;
        SymmetricCipher::decrypt(key, &iv, ciphertext)
    }

    /// Decrypt with an explicit IV.
    pub fn decrypt_with(&self, ciphertext: &str, iv: &Iv) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let key = self.ready(&mut state)?;
        SymmetricCipher::decrypt(key, iv, ciphertext)
    }

    /// Wipe every keystore alias and the key-material document.
    ///
    /// A reset whose key-material document survived is reported as
    /// incomplete rather than as an error.
    #[instrument(skip_all, fields(alias = %self.alias))]
    pub fn reset(&self) -> Result<ResetOutcome, StoreError> {
        let mut state = self.lock()?;
        *state = None;

        let aliases = self.provider.delete_all()?;
        warn!(aliases, "removed keystore aliases");
        let keys_removed = self.keys.reset()?.is_complete();

        Ok(ResetOutcome::Keys {
            aliases,
            complete: keys_removed,
        })
    }

    /// Currently committed IV.
    pub(crate) fn remembered_iv(&self) -> Result<Iv, StoreError> {
        let mut state = self.lock()?;
        self.ready(&mut state)?;
        self.committed_iv()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SymmetricKey>>, StoreError> {
        self.state.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }

    fn ready<'a>(
        &self,
        state: &'a mut Option<SymmetricKey>,
    ) -> Result<&'a SymmetricKey, StoreError> {
        let key = match state.take() {
            Some(key) => key,
            None => self.initialize()?,
        };
        Ok(state.insert(key))
    }

    fn initialize(&self) -> Result<SymmetricKey, StoreError> {
        self.provider.ensure_key_pair(&self.alias)?;

        let mut material = self.keys.get()?;
        match material.wrapped_secret() {
            Some(wrapped) => {
                let bytes = Zeroizing::new(self.provider.unwrap(wrapped, &self.alias)?);
                debug!(alias = %self.alias, "restored data key");
                Ok(SymmetricKey::from_slice(&bytes)?)
            }
            None => {
                let key = SymmetricKey::generate();
                material.secret = Some(self.provider.wrap(key.as_bytes(), &self.alias)?);
                self.keys.set(&material)?;
                info!(alias = %self.alias, "generated data key");
                Ok(key)
            }
        }
    }

    fn committed_iv(&self) -> Result<Iv, StoreError> {
        let material = self.keys.get()?;
        self.unwrap_iv(&material)?.ok_or(StoreError::MissingIv)
    }

    fn unwrap_iv(&self, material: &KeyMaterial) -> Result<Option<Iv>, StoreError> {
        let Some(wrapped) = material.wrapped_vector() else {
            return Ok(None);
        };
        let bytes = self.provider.unwrap(wrapped, &self.alias)?;
        let iv: Iv = bytes.as_slice().try_into().map_err(|_| {
            KeyError::Decode(format!("expected {IV_SIZE} IV bytes, got {}", bytes.len()))
        })?;
        Ok(Some(iv))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Duration;
    use docustream_core::DocumentRoot;

    use super::*;
    use crate::{fixtures::app_context, key_provider::InMemoryKeyProvider};

    fn cipher(ctx: &StoreContext, provider: &InMemoryKeyProvider) -> Cipher {
        Cipher::new(ctx, Arc::new(provider.clone())).expect("cipher")
    }

    #[test]
    fn rejects_component_context() {
        let (_dir, ctx) = app_context();
        let err = Cipher::new(&ctx.component(), Arc::new(InMemoryKeyProvider::default())).err();
        assert_eq!(err, Some(StoreError::InvalidContext));
    }

    #[test]
    fn initialization_creates_pair_and_wrapped_secret() {
        let (_dir, ctx) = app_context();
        let provider = InMemoryKeyProvider::default();
        let cipher = cipher(&ctx, &provider);

        assert!(cipher.is_ready());
        assert!(provider.contains_alias(MASTER_ALIAS).unwrap());
        let material = cipher.key_document().get().unwrap();
        assert!(material.wrapped_secret().is_some());
        assert!(material.wrapped_vector().is_none());
    }

    #[test]
    fn data_key_is_restored_not_regenerated() {
        let (_dir, ctx) = app_context();
        let provider = InMemoryKeyProvider::default();
        let iv = random_iv();

        let first = cipher(&ctx, &provider);
        let secret = first.key_document().get().unwrap().secret;
        let ciphertext = first.encrypt("{\"a\":1}", &iv).unwrap();

        let second = cipher(&ctx, &provider);
        assert_eq!(second.key_document().get().unwrap().secret, secret);
        assert_eq!(second.encrypt("{\"a\":1}", &iv).unwrap(), ciphertext);
        assert_eq!(second.decrypt_with(&ciphertext, &iv).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn generated_ivs_differ() {
        let (_dir, ctx) = app_context();
        let cipher = cipher(&ctx, &InMemoryKeyProvider::default());
        let a = cipher.generate_iv();
        let b = cipher.generate_iv();
        assert_eq!(a.len(), IV_SIZE);
        assert_ne!(a, b);
    }

    #[test]
    fn decrypt_without_committed_iv_is_missing_iv() {
        let (_dir, ctx) = app_context();
        let cipher = cipher(&ctx, &InMemoryKeyProvider::default());
        let iv = cipher.generate_iv();
        let ciphertext = cipher.encrypt("{}", &iv).unwrap();
        assert_eq!(cipher.decrypt(&ciphertext), Err(StoreError::MissingIv));
    }

    #[test]
    fn remembered_iv_decrypts_and_rejects_reuse() {
        let (_dir, ctx) = app_context();
        let cipher = cipher(&ctx, &InMemoryKeyProvider::default());

        let iv = cipher.generate_iv();
        let ciphertext = cipher.encrypt("{\"name\":\"bob\"}", &iv).unwrap();
        cipher.remember_iv(&iv).unwrap();
        assert_eq!(cipher.remembered_iv().unwrap(), iv);
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "{\"name\":\"bob\"}");

        assert_eq!(cipher.remember_iv(&iv), Err(StoreError::DuplicateIv));

        let next = cipher.generate_iv();
        cipher.remember_iv(&next).unwrap();
        assert_eq!(cipher.decrypt(&ciphertext), Err(StoreError::DecryptionFailed));
    }

    #[test]
    fn malformed_key_file_keeps_the_loaded_data_key() {
        let (dir, ctx) = app_context();
        let provider = InMemoryKeyProvider::default();
        let cipher = cipher(&ctx, &provider);
        let iv = cipher.generate_iv();
        let ciphertext = cipher.encrypt("{\"a\":1}", &iv).unwrap();
        let secret = cipher.key_document().get().unwrap().secret;

        fs::write(dir.path().join(KeyMaterial::TAG), "{not json").unwrap();
        cipher.remember_iv(&iv).unwrap();

        let material = cipher.key_document().get().unwrap();
        assert!(material.wrapped_secret().is_some());
        assert_ne!(material.secret, secret, "sealing is randomized");

        let restarted = Cipher::new(&ctx, Arc::new(provider.clone())).unwrap();
        assert_eq!(restarted.decrypt(&ciphertext).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn key_file_holds_only_wrapped_values() {
        let (_dir, ctx) = app_context();
        let cipher = cipher(&ctx, &InMemoryKeyProvider::default());
        let iv = cipher.generate_iv();
        cipher.remember_iv(&iv).unwrap();

        let raw = cipher.key_document().raw_contents().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("secret"));
        assert!(object.contains_key("vector"));

        use base64::{engine::general_purpose::STANDARD, Engine as _};
        assert!(!raw.contains(&STANDARD.encode(iv)));
    }

    #[test]
    fn reset_wipes_keys_and_reinitializes_lazily() {
        let (dir, ctx) = app_context();
        let provider = InMemoryKeyProvider::default();
        let cipher = cipher(&ctx, &provider);
        let public = cipher.public_key().unwrap();
        let iv = cipher.generate_iv();
        let before = cipher.encrypt("same", &iv).unwrap();

        assert_eq!(
            cipher.reset().unwrap(),
            ResetOutcome::Keys {
                aliases: 1,
                complete: true
            }
        );
        assert!(!cipher.is_ready());
        assert!(!provider.contains_alias(MASTER_ALIAS).unwrap());
        assert!(!dir.path().join(KeyMaterial::TAG).exists());

        let after = cipher.encrypt("same", &iv).unwrap();
        assert!(cipher.is_ready());
        assert_ne!(before, after, "a new data key must be generated");
        assert_ne!(cipher.public_key().unwrap(), public);
    }

    #[test]
    fn partial_reset_is_signalled() {
        let (dir, ctx) = app_context();
        let cipher = cipher(&ctx, &InMemoryKeyProvider::default());

        // A directory in place of the key file cannot be removed as a file.
        let key_path = dir.path().join(KeyMaterial::TAG);
        fs::remove_file(&key_path).unwrap();
        fs::create_dir(&key_path).unwrap();

        let outcome = cipher.reset().unwrap();
        assert_eq!(
            outcome,
            ResetOutcome::Keys {
                aliases: 1,
                complete: false
            }
        );
        assert_eq!(outcome.code(), -1);
    }

    #[test]
    fn separate_key_files_keep_documents_independent() {
        let (dir, ctx) = app_context();
        let provider = Arc::new(InMemoryKeyProvider::default());
        let a = Cipher::builder(&ctx, provider.clone())
            .key_file_name("KeysA")
            .build()
            .unwrap();
        let b = Cipher::builder(&ctx, provider)
            .key_file_name("KeysB")
            .build()
            .unwrap();

        assert!(dir.path().join("KeysA").exists());
        assert!(dir.path().join("KeysB").exists());
        assert_ne!(
            a.key_document().get().unwrap().secret,
            b.key_document().get().unwrap().secret
        );
    }

    #[test]
    fn expired_master_pair_fails_loudly() {
        let (_dir, ctx) = app_context();
        let provider = InMemoryKeyProvider::with_lifetime(Duration::seconds(-1));
        let err = Cipher::new(&ctx, Arc::new(provider)).err();
        assert!(matches!(err, Some(StoreError::Key(KeyError::Expired { .. }))));
    }
}
