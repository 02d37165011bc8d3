//! A stored phrase-book document as handed over by a loader.

use serde::{Deserialize, Serialize};

/// The host-owned shape of a saved document. Only `source` matters to the
/// engine; `seed` and `parent` ride along for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Document {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            seed: None,
            parent: None,
        }
    }
}

impl From<&str> for Document {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for Document {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}
