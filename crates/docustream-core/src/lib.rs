//! Core contracts for DocuStream: errors, the secure key provider interface,
//! ownership context, and serializer configuration.

pub mod adapters;
pub mod codec;
pub mod common;
pub mod context;
pub mod document;
pub mod error;
pub mod keys;

pub use codec::{JsonCodec, SerializerConfig};
pub use context::{Scope, StoreContext};
pub use document::{DocumentRoot, ResetOutcome};
pub use error::{KeyError, StoreError};
pub use keys::{MasterPublicKey, SecureKeyProvider, Validity, MASTER_ALIAS};
