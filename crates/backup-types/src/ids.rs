//! The run identifier.
//!
//! Every copy attempt gets one `run_uuid`, minted by the producer when an
//! object-created notification arrives. The worker never interprets it: it
//! only keys rows and correlates `start` with `end`. Older producers may emit
//! identifiers that are not UUIDs, so the wrapper holds a string.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a single copy attempt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Mint a fresh identifier using UUID v4.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
