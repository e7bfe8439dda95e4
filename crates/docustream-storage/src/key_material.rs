use docustream_core::DocumentRoot;
use serde::{Deserialize, Serialize};

/// Wrapped data key and wrapped last-used IV. Stored as plaintext JSON; each
/// field is sealed to the master pair on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMaterial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<String>,
}

impl KeyMaterial {
    /// The wrapped secret, treating an empty string as absent.
    pub fn wrapped_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn wrapped_vector(&self) -> Option<&str> {
        self.vector.as_deref().filter(|s| !s.is_empty())
    }
}

impl DocumentRoot for KeyMaterial {
    const TAG: &'static str = "Keys";
}
