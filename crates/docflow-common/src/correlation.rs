use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ID for tracking operations across service boundaries
///
/// Submissions may supply any free-form tracing tag; when none is given, a
/// UUID v4 is generated so every job still has a globally-unique one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh correlation ID (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CorrelationId {
    fn from(tag: &str) -> Self {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            Self::new()
        } else {
            Self(trimmed.to_string())
        }
    }
}
