use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by secure key providers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// No master pair exists under the alias.
    #[error("no key pair stored under alias: {alias}")]
    MissingKeyPair { alias: String },
    /// The pair's validity window has closed. Rotation is not supported.
    #[error("key pair {alias} expired at {not_after}")]
    Expired {
        alias: String,
        not_after: DateTime<Utc>,
    },
    /// The pair's validity window has not opened yet.
    #[error("key pair {alias} is not valid before {not_before}")]
    NotYetValid {
        alias: String,
        not_before: DateTime<Utc>,
    },
    /// Underlying keystore failure.
    #[error("keystore error: {0}")]
    Keystore(String),
    #[error("wrap failed: {0}")]
    Wrap(String),
    #[error("unwrap failed: {0}")]
    Unwrap(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors produced by documents and the cipher that protects them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The context handed to a constructor is not the application-scoped owner.
    #[error("context must be the application-scoped owner")]
    InvalidContext,
    /// The serializer was configured to escape HTML characters.
    #[error("serializer must not escape HTML characters")]
    InvalidSerializerConfig,
    /// Ciphertext could not be read back with the current key and IV.
    #[error("stored document is unreadable: {reason}")]
    CorruptedStore { reason: String },
    /// Plaintext content is empty or not valid JSON for the root type.
    #[error("malformed plaintext: {reason}")]
    MalformedPlaintext { reason: String },
    /// No IV has been committed for the encrypted document.
    #[error("no initialization vector has been committed")]
    MissingIv,
    /// The candidate IV equals the one already committed.
    #[error("initialization vector equals the committed one; refusing to store it")]
    DuplicateIv,
    /// Symmetric authentication or decoding failure.
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("key provider: {0}")]
    Key(#[from] KeyError),
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
    /// Underlying I/O or lock failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl StoreError {
    /// True for failures that mean the encrypted payload cannot be recovered
    /// with the key material at hand.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            StoreError::DecryptionFailed
                | StoreError::MissingIv
                | StoreError::CorruptedStore { .. }
                | StoreError::Key(KeyError::Unwrap(_))
                | StoreError::Key(KeyError::Decode(_))
        )
    }
}

/// Map any displayable error into [`StoreError::Storage`].
pub fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}
