/// Event types emitted by the plan watcher.

use serde::{Deserialize, Serialize};

/// SHA-256 fingerprint of document content with normalized line endings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    pub fn from_content(content: &str) -> Self {
        use sha2::{Digest, Sha256};
        let normalized = content.replace("\r\n", "\n");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

/// Notifications about the plan document's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// Content changed, by us or by someone else.
    Changed,
    Created,
    Deleted,
}

/// Who caused a `PlanEvent::Changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    Internal,
    External,
}
