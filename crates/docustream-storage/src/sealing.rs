//! Asymmetric sealing used to wrap small secrets to a master public key.
//!
//! Wire format (standard base64 of):
//! ```text
//! [ephemeral_public (32)][nonce (12)][ciphertext + tag]
//! ```
//! The wrapping key is `HKDF-SHA256(X25519(ephemeral, recipient))` with the
//! ephemeral public key as salt.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use docustream_core::KeyError;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

const WRAP_INFO: &[u8] = b"docustream/master-wrap/v1";
const EPHEMERAL_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

pub(crate) fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<String, KeyError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let cipher = wrapping_cipher(ephemeral_public.as_bytes(), shared.as_bytes())
        .map_err(KeyError::Wrap)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| KeyError::Wrap(e.to_string()))?;

    let mut out = Vec::with_capacity(EPHEMERAL_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

pub(crate) fn open(secret: &StaticSecret, wrapped: &str) -> Result<Vec<u8>, KeyError> {
    let bytes = STANDARD
        .decode(wrapped.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;
    if bytes.len() < EPHEMERAL_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(KeyError::Decode(format!(
            "wrapped value too short: {} bytes",
            bytes.len()
        )));
    }

    let (ephemeral_bytes, rest) = bytes.split_at(EPHEMERAL_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut ephemeral = [0u8; EPHEMERAL_SIZE];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = PublicKey::from(ephemeral);
    let shared = secret.diffie_hellman(&ephemeral_public);

    let cipher = wrapping_cipher(ephemeral_public.as_bytes(), shared.as_bytes())
        .map_err(KeyError::Unwrap)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| KeyError::Unwrap("authentication failed".to_string()))
}

fn wrapping_cipher(salt: &[u8], shared: &[u8]) -> Result<Aes256Gcm, String> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared);
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(WRAP_INFO, okm.as_mut_slice())
        .map_err(|e| format!("key derivation failed: {e}"))?;
    Aes256Gcm::new_from_slice(okm.as_slice()).map_err(|e| format!("cipher init failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn seal_then_open() {
        let (secret, public) = pair();
        let wrapped = seal(&public, b"1234567890").expect("seal");
        assert_eq!(open(&secret, &wrapped).expect("open"), b"1234567890");
    }

    #[test]
    fn sealing_is_randomized() {
        let (_, public) = pair();
        let a = seal(&public, b"same").expect("seal");
        let b = seal(&public, b"same").expect("seal");
        assert_ne!(a, b);
    }

    #[test]
    fn other_pair_cannot_open() {
        let (_, public) = pair();
        let (other_secret, _) = pair();
        let wrapped = seal(&public, b"secret").expect("seal");
        let err = open(&other_secret, &wrapped).expect_err("wrong pair");
        assert!(matches!(err, KeyError::Unwrap(_)));
    }

    #[test]
    fn rejects_truncated_input() {
        let (secret, _) = pair();
        let err = open(&secret, "AAAA").expect_err("too short");
        assert!(matches!(err, KeyError::Decode(_)));
        let err = open(&secret, "%%%").expect_err("not base64");
        assert!(matches!(err, KeyError::Decode(_)));
    }
}
