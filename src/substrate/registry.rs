// ABOUTME: Artifact registry contract with immutable tags.
// ABOUTME: A tag, once pushed, always resolves to the same digest; re-pushing different content fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{ArtifactRef, RevisionId};

#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Record a built artifact for `revision` and return its pinned reference.
    async fn push(
        &self,
        revision: &RevisionId,
        built: &ArtifactRef,
    ) -> Result<ArtifactRef, RegistryError>;

    /// Resolve a reference to its pinned (digest) form.
    async fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactRef, RegistryError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("tag {tag} is immutable: already {existing}, refusing {attempted}")]
    TagImmutable {
        tag: String,
        existing: String,
        attempted: String,
    },

    #[error("artifact {0} has no digest; only immutable references can be pushed")]
    MissingDigest(String),

    #[error("artifact {0} not found in registry")]
    NotFound(String),

    #[error("failed to persist registry ledger: {0}")]
    Persist(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub digest: String,
    pub revision: RevisionId,
    pub pushed_at: DateTime<Utc>,
}

/// Tag → digest bookkeeping for immutable tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLedger {
    entries: BTreeMap<String, TagEntry>,
}

fn tag_key(reference: &ArtifactRef, tag: &str) -> String {
    match reference.registry() {
        Some(registry) => format!("{}/{}:{}", registry, reference.repository(), tag),
        None => format!("{}:{}", reference.repository(), tag),
    }
}

impl TagLedger {
    pub fn record(
        &mut self,
        revision: &RevisionId,
        built: &ArtifactRef,
    ) -> Result<ArtifactRef, RegistryError> {
        let digest = built
            .digest()
            .ok_or_else(|| RegistryError::MissingDigest(built.to_string()))?;
        let tag = built.tag().unwrap_or_else(|| revision.short()).to_string();
        let key = tag_key(built, &tag);
        let pinned = built
            .with_tag(&tag)
            .with_digest(digest)
            .map_err(|e| RegistryError::MissingDigest(e.to_string()))?;

        if let Some(existing) = self.entries.get(&key) {
            if existing.digest != digest {
                return Err(RegistryError::TagImmutable {
                    tag: key,
                    existing: existing.digest.clone(),
                    attempted: digest.to_string(),
                });
            }
            return Ok(pinned);
        }

        self.entries.insert(
            key,
            TagEntry {
                digest: digest.to_string(),
                revision: revision.clone(),
                pushed_at: Utc::now(),
            },
        );
        Ok(pinned)
    }

    pub fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactRef, RegistryError> {
        let Some(tag) = reference.tag() else {
            // Digest-only references are already pinned.
            return Ok(reference.clone());
        };
        match (self.entries.get(&tag_key(reference, tag)), reference.digest()) {
            (Some(entry), Some(digest)) if entry.digest != digest => {
                Err(RegistryError::TagImmutable {
                    tag: tag_key(reference, tag),
                    existing: entry.digest.clone(),
                    attempted: digest.to_string(),
                })
            }
            (Some(entry), _) => reference
                .with_digest(&entry.digest)
                .map_err(|_| RegistryError::NotFound(reference.to_string())),
            (None, Some(_)) => Ok(reference.clone()),
            (None, None) => Err(RegistryError::NotFound(reference.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry backed by a [`TagLedger`], optionally persisted as JSON.
#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledger: Mutex<TagLedger>,
    path: Option<PathBuf>,
}

impl LedgerRegistry {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger from `path` (empty if missing); pushes are written back.
    pub fn open(path: PathBuf) -> Result<Self, RegistryError> {
        let ledger = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| RegistryError::Persist(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TagLedger::default(),
            Err(e) => return Err(RegistryError::Persist(e.to_string())),
        };
        Ok(Self {
            ledger: Mutex::new(ledger),
            path: Some(path),
        })
    }

    pub fn snapshot(&self) -> TagLedger {
        self.ledger.lock().clone()
    }

    async fn persist(&self, ledger: &TagLedger) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(ledger)
            .map_err(|e| RegistryError::Persist(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::Persist(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RegistryError::Persist(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| RegistryError::Persist(e.to_string()))
    }
}

#[async_trait]
impl ArtifactRegistry for LedgerRegistry {
    async fn push(
        &self,
        revision: &RevisionId,
        built: &ArtifactRef,
    ) -> Result<ArtifactRef, RegistryError> {
        let (pinned, snapshot) = {
            let mut ledger = self.ledger.lock();
            let before = ledger.len();
            let pinned = ledger.record(revision, built)?;
            let changed = ledger.len() != before;
            (pinned, changed.then(|| ledger.clone()))
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot).await?;
        }
        tracing::info!(artifact = %pinned, revision = %revision, "artifact pushed");
        Ok(pinned)
    }

    async fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactRef, RegistryError> {
        self.ledger.lock().resolve(reference)
    }
}
