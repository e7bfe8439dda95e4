use std::{path::PathBuf, sync::Arc};

use crate::{
    config::{Config, KeystoreBackend},
    profile::Profile,
};
use color_eyre::Result;
use dirs::data_dir;
use docustream_core::{SecureKeyProvider, SerializerConfig, StoreContext};
use docustream_storage::{Cipher, Document, FileKeyProvider, KeyringProvider};
use tracing::debug;

/// Key file used by the file keystore, inside the data directory.
const KEYSTORE_FILE: &str = "keystore.json";

/// Resolve the default data directory for DocuStream.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("docustream"))
}

/// Application context rooted at the configured data directory.
pub fn context_from_config(config: &Config) -> Result<StoreContext> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    Ok(StoreContext::application(root))
}

/// Keystore for the configured backend.
pub fn provider_from_config(config: &Config, context: &StoreContext) -> Arc<dyn SecureKeyProvider> {
    match config.keystore {
        KeystoreBackend::Keyring => Arc::new(KeyringProvider::new(config.service.clone())),
        KeystoreBackend::File => {
            Arc::new(FileKeyProvider::new(context.files_dir().join(KEYSTORE_FILE)))
        }
    }
}

/// Open the profile document the way the config asks for.
pub fn profile_from_config(config: &Config) -> Result<Document<Profile>> {
    let context = context_from_config(config)?;
    let provider = provider_from_config(config, &context);
    open_profile(config, &context, provider)
}

pub fn open_profile(
    config: &Config,
    context: &StoreContext,
    provider: Arc<dyn SecureKeyProvider>,
) -> Result<Document<Profile>> {
    debug!(root = ?context.files_dir(), encrypt = config.encrypt, "opening profile store");
    let mut builder = Document::<Profile>::builder(context)
        .serializer(SerializerConfig::new().pretty(config.pretty));
    if config.encrypt {
        builder = builder.cipher(Cipher::new(context, provider)?);
    }
    Ok(builder.build()?)
}

/// Helper for tests to open a profile rooted at a temp dir with an in-memory keystore.
#[cfg(test)]
pub fn test_profile(
    root: impl Into<PathBuf>,
    provider: &docustream_storage::InMemoryKeyProvider,
) -> Result<Document<Profile>> {
    let context = StoreContext::application(root);
    open_profile(&Config::default(), &context, Arc::new(provider.clone()))
}
