use serde::{de::DeserializeOwned, Serialize};

/// A type that can be the root record of a document.
///
/// `TAG` names the backing file when no explicit name is given. Structs should
/// carry `#[serde(default)]` so the empty object decodes to `Default::default()`.
pub trait DocumentRoot: Serialize + DeserializeOwned + Default + Send + 'static {
    const TAG: &'static str;
}

impl DocumentRoot for String {
    const TAG: &'static str = "String";
}

/// Result of resetting a document or a cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Unencrypted document: whether the backing file is gone.
    File { removed: bool },
    /// Cipher reset: keystore aliases removed, and whether the key-material
    /// document (and the data file, for a document reset) went with them.
    Keys { aliases: usize, complete: bool },
}

impl ResetOutcome {
    pub fn is_complete(&self) -> bool {
        match self {
            ResetOutcome::File { removed } => *removed,
            ResetOutcome::Keys { complete, .. } => *complete,
        }
    }

    /// Mark a partial reset.
    pub fn incomplete(self) -> Self {
        match self {
            ResetOutcome::File { .. } => ResetOutcome::File { removed: false },
            ResetOutcome::Keys { aliases, .. } => ResetOutcome::Keys {
                aliases,
                complete: false,
            },
        }
    }

    /// Integer form: `1`/`0` for files, the alias count for a complete key
    /// reset and its negation for a partial one.
    pub fn code(&self) -> i64 {
        match *self {
            ResetOutcome::File { removed } => i64::from(removed),
            ResetOutcome::Keys { aliases, complete } => {
                let count = aliases as i64;
                if complete {
                    count
                } else {
                    -count
                }
            }
        }
    }
}
