use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes256,
    AesGcm,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use docustream_core::{KeyError, StoreError};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Data key size in bytes (AES-256).
pub const SECRET_KEY_SIZE: usize = 32;

/// Per-write initialization vector.
pub type Iv = [u8; IV_SIZE];

/// AES-256-GCM keyed with a full 16-byte IV.
type DataCipher = AesGcm<Aes256, U16>;

/// Symmetric data key. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; SECRET_KEY_SIZE],
}

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(KeyError::Decode(format!(
                "expected {SECRET_KEY_SIZE} key bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; SECRET_KEY_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self { bytes: out })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Fresh random IV.
pub fn random_iv() -> Iv {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Stateless text encryption with an explicit IV. Output is standard base64.
pub struct SymmetricCipher;

impl SymmetricCipher {
    pub fn encrypt(key: &SymmetricKey, iv: &Iv, plaintext: &str) -> Result<String, StoreError> {
        let cipher = build_cipher(key)?;
        let ciphertext = cipher
            .encrypt(GenericArray::from_slice(iv), plaintext.as_bytes())
            .map_err(|e| StoreError::Storage {
                reason: format!("encrypt failed: {e}"),
            })?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Fails with [`StoreError::DecryptionFailed`] on bad encoding, tag
    /// mismatch, or non-UTF-8 output.
    pub fn decrypt(key: &SymmetricKey, iv: &Iv, ciphertext: &str) -> Result<String, StoreError> {
        let cipher = build_cipher(key)?;
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| StoreError::DecryptionFailed)?;
        let plaintext = cipher
            .decrypt(GenericArray::from_slice(iv), bytes.as_slice())
            .map_err(|_| StoreError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| StoreError::DecryptionFailed)
    }
}

fn build_cipher(key: &SymmetricKey) -> Result<DataCipher, StoreError> {
    DataCipher::new_from_slice(key.as_bytes()).map_err(|e| StoreError::Storage {
        reason: format!("cipher init failed: {e}"),
    })
}
