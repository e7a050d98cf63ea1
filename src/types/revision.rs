// ABOUTME: Source revision identifiers and push trigger events.
// ABOUTME: A trigger event names the revision and branch the pipeline should release.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("revision id cannot be empty")]
    Empty,

    #[error("invalid character in revision id: '{0}'")]
    InvalidChar(char),
}

/// A source-control revision (commit SHA or similar opaque id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(value: &str) -> Result<Self, RevisionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RevisionError::Empty);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !"-_.".contains(*c))
        {
            return Err(RevisionError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used as the artifact tag.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RevisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RevisionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RevisionId::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Push notification delivered by the source-control integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub revision: RevisionId,
    pub branch: String,
}

impl TriggerEvent {
    pub fn new(revision: RevisionId, branch: impl Into<String>) -> Self {
        Self {
            revision,
            branch: branch.into(),
        }
    }
}
