use std::{
    fs,
    io::Write,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use docustream_core::{
    error::storage_err, DocumentRoot, JsonCodec, ResetOutcome, SerializerConfig, StoreContext,
    StoreError,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::cipher::Cipher;

/// Payload written when a document is first touched.
pub const DEFAULT_PAYLOAD: &str = "{}";

/// Single-file store for one root record of type `T`, optionally encrypted.
///
/// Keep one instance per file for the life of the process and share it
/// (e.g. behind an `Arc`). Every operation runs under the instance lock, so
/// concurrent callers never interleave an IV commit with another write.
/// Two processes opening the same file are not supported.
pub struct Document<T: DocumentRoot> {
    path: PathBuf,
    codec: JsonCodec,
    // Boxed: a Cipher owns its own key-material Document.
    cipher: Option<Box<Cipher>>,
    lock: Mutex<()>,
    _root: PhantomData<fn() -> T>,
}

/// Builder for [`Document`]. Building does no I/O.
pub struct DocumentBuilder<T: DocumentRoot> {
    context: StoreContext,
    directory: Option<PathBuf>,
    file_name: Option<String>,
    serializer: SerializerConfig,
    cipher: Option<Box<Cipher>>,
    _root: PhantomData<fn() -> T>,
}

impl<T: DocumentRoot> DocumentBuilder<T> {
    /// Storage directory; defaults to the context's files directory.
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// File name; defaults to `T::TAG`.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn serializer(mut self, config: SerializerConfig) -> Self {
        self.serializer = config;
        self
    }

    pub fn cipher(mut self, cipher: Cipher) -> Self {
        self.cipher = Some(Box::new(cipher));
        self
    }

    pub fn build(self) -> Result<Document<T>, StoreError> {
        self.context.require_application()?;
        let codec = JsonCodec::from_config(&self.serializer)?;

        let directory = self
            .directory
            .unwrap_or_else(|| self.context.files_dir().to_path_buf());
        let file_name = self.file_name.unwrap_or_else(|| T::TAG.to_string());

        Ok(Document {
            path: directory.join(file_name),
            codec,
            cipher: self.cipher,
            lock: Mutex::new(()),
            _root: PhantomData,
        })
    }
}

impl<T: DocumentRoot> Document<T> {
    pub fn builder(context: &StoreContext) -> DocumentBuilder<T> {
        DocumentBuilder {
            context: context.clone(),
            directory: None,
            file_name: None,
            serializer: SerializerConfig::default(),
            cipher: None,
            _root: PhantomData,
        }
    }

    /// Unencrypted document with default settings.
    pub fn new(context: &StoreContext) -> Result<Self, StoreError> {
        Self::builder(context).build()
    }

    /// Encrypted document with default settings.
    pub fn encrypted(context: &StoreContext, cipher: Cipher) -> Result<Self, StoreError> {
        Self::builder(context).cipher(cipher).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_deref()
    }

    /// Read the root record.
    ///
    /// Empty or malformed plaintext yields `T::default()`. Ciphertext that
    /// cannot be decrypted is reported as [`StoreError::CorruptedStore`].
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn get(&self) -> Result<T, StoreError> {
        let _guard = self.lock()?;
        self.ensure_file()?;

        let contents = read_text(&self.path)?;
        let plaintext = match &self.cipher {
            Some(cipher) => cipher.decrypt(&contents).map_err(corrupted)?,
            None => contents,
        };

        match self.codec.from_text(&plaintext) {
            Ok(value) => Ok(value),
            Err(StoreError::MalformedPlaintext { reason }) => {
                warn!(%reason, "malformed document contents; using default value");
                Ok(T::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Replace the whole file with `value`.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn set(&self, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        self.ensure_file()?;
        let json = self.codec.to_text(value)?;
        self.write_payload(&json)
    }

    /// Delete the backing file. With a cipher attached the reset cascades to
    /// the keystore and key material, and the cipher's outcome is returned.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn reset(&self) -> Result<ResetOutcome, StoreError> {
        let _guard = self.lock()?;
        let removed = remove_file(&self.path);
        warn!(removed, "document file deleted");

        match &self.cipher {
            None => Ok(ResetOutcome::File { removed }),
            Some(cipher) => {
                let outcome = cipher.reset()?;
                Ok(if removed { outcome } else { outcome.incomplete() })
            }
        }
    }

    /// On-disk contents as text: ciphertext when encrypted.
    pub fn raw_contents(&self) -> Result<String, StoreError> {
        let _guard = self.lock()?;
        self.ensure_file()?;
        read_text(&self.path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }

    fn ensure_file(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        debug!("creating document with empty payload");
        self.write_payload(DEFAULT_PAYLOAD)
    }

    /// IV is committed only after the ciphertext is on disk.
    fn write_payload(&self, json: &str) -> Result<(), StoreError> {
        match &self.cipher {
            Some(cipher) => {
                let iv = cipher.generate_iv();
                let ciphertext = cipher.encrypt(json, &iv)?;
                write_atomic(&self.path, &ciphertext)?;
                cipher.remember_iv(&iv)
            }
            None => write_atomic(&self.path, json),
        }
    }
}

fn corrupted(err: StoreError) -> StoreError {
    match err {
        StoreError::CorruptedStore { .. } => err,
        err if err.is_unreadable() => StoreError::CorruptedStore {
            reason: err.to_string(),
        },
        err => err,
    }
}

fn read_text(path: &Path) -> Result<String, StoreError> {
    let bytes = fs::read(path).map_err(storage_err)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    StoreContext::ensure_private_dir(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(contents.as_bytes()).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(_) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "could not delete file");
            false
        }
    }
}
