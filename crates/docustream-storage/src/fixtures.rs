//! Shared test roots and a throwaway application context.

use docustream_core::{DocumentRoot, StoreContext};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

pub fn app_context() -> (TempDir, StoreContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = StoreContext::application(dir.path());
    (dir, ctx)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Example {
    pub name: String,
    pub age: i32,
    pub variable: String,
    pub simple: Option<Simple>,
    #[serde(with = "docustream_core::adapters::base64_bytes_opt")]
    pub avatar: Option<Vec<u8>>,
}

impl Example {
    pub fn person(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Self::default()
        }
    }
}

impl Default for Example {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            age: -1,
            variable: "this value is from the default file (unchanged and untouched)".to_string(),
            simple: None,
            avatar: None,
        }
    }
}

impl DocumentRoot for Example {
    const TAG: &'static str = "Example";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Simple {
    pub contents: String,
}

impl DocumentRoot for Simple {
    const TAG: &'static str = "Simple";
}
