//! Document storage with envelope encryption at rest.
//! Master pairs live in a keystore (OS keyring, key file, or memory); data
//! keys and IVs are sealed to them and kept next to the documents.

pub mod cipher;
pub mod document;
pub mod key_material;
pub mod key_provider;
mod sealing;
pub mod symmetric;

#[cfg(test)]
mod fixtures;

pub use cipher::{Cipher, CipherBuilder};
pub use document::{Document, DocumentBuilder, DEFAULT_PAYLOAD};
pub use key_material::KeyMaterial;
pub use key_provider::{FileKeyProvider, InMemoryKeyProvider, KeyringProvider};
