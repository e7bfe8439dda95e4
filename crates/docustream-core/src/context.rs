use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{storage_err, StoreError};

/// Lifetime scope of a [`StoreContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Process-wide owner. Documents and ciphers must be built from this scope.
    Application,
    /// Short-lived handle borrowed by a single component.
    Component,
}

/// Owning context for stores: a private storage directory plus the scope of
/// the handle. Create one application context at startup and keep it for the
/// life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContext {
    files_dir: PathBuf,
    scope: Scope,
}

impl StoreContext {
    pub fn application(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            scope: Scope::Application,
        }
    }

    /// A component-scoped handle sharing this context's directory.
    pub fn component(&self) -> Self {
        Self {
            files_dir: self.files_dir.clone(),
            scope: Scope::Component,
        }
    }

    /// The application-scoped context behind any handle.
    pub fn application_context(&self) -> Self {
        Self::application(self.files_dir.clone())
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_application(&self) -> bool {
        self.scope == Scope::Application
    }

    /// Reject any handle that is not the application owner.
    pub fn require_application(&self) -> Result<(), StoreError> {
        if self.is_application() {
            Ok(())
        } else {
            Err(StoreError::InvalidContext)
        }
    }

    /// Create `dir` if missing, owner-only on unix.
    pub fn ensure_private_dir(dir: &Path) -> Result<(), StoreError> {
        if dir.is_dir() {
            return Ok(());
        }
        debug!(?dir, "creating private storage directory");
        fs::create_dir_all(dir).map_err(storage_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(storage_err)?;
        }
        Ok(())
    }
}
