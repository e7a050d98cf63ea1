// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Keeps endpoint, target group, rule, deployment, and pipeline run IDs apart.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker types for phantom type parameters.
pub enum EndpointMarker {}
pub enum TargetGroupMarker {}
pub enum RuleMarker {}
pub enum DeploymentMarker {}
pub enum PipelineRunMarker {}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A type-safe identifier.
///
/// A `TargetGroupId` can't be passed where a `RuleId` is expected even though
/// both are strings handed to the routing layer.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Generate a fresh, process-unique identifier with the given prefix.
    ///
    /// The timestamp keeps IDs sortable across runs; the sequence number keeps
    /// them unique within a single second.
    pub fn generate(prefix: &str) -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self::new(format!(
            "{}-{}-{:04}",
            prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            seq % 10_000
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// T is only a marker, so these impls must not require T: Trait.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// A compute endpoint address (e.g. `10.100.2.17:80`).
pub type EndpointId = Id<EndpointMarker>;
/// Provider identity of a target group.
pub type TargetGroupId = Id<TargetGroupMarker>;
/// Provider identity of a listener rule.
pub type RuleId = Id<RuleMarker>;
pub type DeploymentId = Id<DeploymentMarker>;
pub type PipelineRunId = Id<PipelineRunMarker>;
