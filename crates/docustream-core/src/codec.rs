use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

/// Serializer settings for a document.
///
/// HTML escaping must stay off: escaped text would change the bytes that get
/// encrypted and break byte-for-byte round trips of markup in string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializerConfig {
    pub escape_html: bool,
    pub pretty: bool,
}

impl SerializerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escape_html(mut self, enabled: bool) -> Self {
        self.escape_html = enabled;
        self
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }
}

/// JSON text codec built from a validated [`SerializerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn from_config(config: &SerializerConfig) -> Result<Self, StoreError> {
        if config.escape_html {
            return Err(StoreError::InvalidSerializerConfig);
        }
        Ok(Self {
            pretty: config.pretty,
        })
    }

    pub fn to_text<T: Serialize>(&self, value: &T) -> Result<String, StoreError> {
        let out = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        out.map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Empty or malformed input yields [`StoreError::MalformedPlaintext`].
    pub fn from_text<T: DeserializeOwned>(&self, text: &str) -> Result<T, StoreError> {
        if text.trim().is_empty() {
            return Err(StoreError::MalformedPlaintext {
                reason: "empty content".to_string(),
            });
        }
        serde_json::from_str(text).map_err(|e| StoreError::MalformedPlaintext {
            reason: e.to_string(),
        })
    }
}
