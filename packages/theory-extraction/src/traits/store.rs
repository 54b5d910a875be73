//! Storage traits for the call cache and for audit artifacts.
//!
//! The storage layer is split into focused traits:
//! - `AnalysisCache`: content-addressed, write-once cache of validated call output
//! - `ArtifactStore`: versioned intermediate artifacts, retained for audit/resume
//! - `PipelineStore`: composite trait combining both

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Cache key: which template was used and a hash of its normalized input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub template_id: String,
    pub input_hash: String,
}

impl CacheKey {
    pub fn new(template_id: impl Into<String>, input_hash: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            input_hash: input_hash.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.template_id, &self.input_hash[..self.input_hash.len().min(12)])
    }
}

/// Content-addressed cache of validated completion output.
///
/// The only shared mutable resource of a run. Writes are idempotent: the
/// first live value for a key wins.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Get a live (not expired) entry.
    async fn get_cached(&self, key: &CacheKey) -> Result<Option<serde_json::Value>>;

    /// Store a value unless a live entry already exists.
    ///
    /// Returns true if this call inserted the value.
    async fn put_if_absent(
        &self,
        key: &CacheKey,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<bool>;
}

/// Kinds of intermediate artifact kept per segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Segmentation,
    Vocabulary,
    DetectorScores,
    Routing,
    Ontology,
    Blueprint,
}

/// Address of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub document_id: String,
    /// None for document-level artifacts
    pub segment_id: Option<String>,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn document(document_id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            document_id: document_id.into(),
            segment_id: None,
            kind,
        }
    }

    pub fn segment(
        document_id: impl Into<String>,
        segment_id: impl Into<String>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            segment_id: Some(segment_id.into()),
            kind,
        }
    }
}

/// One stored revision of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub key: ArtifactKey,
    /// Starts at 1 and increases by one per changed write
    pub revision: u32,
    pub stored_at: DateTime<Utc>,
    pub value: serde_json::Value,
}

/// Versioned store of intermediate artifacts.
///
/// Artifacts are never mutated in place: a write with new content adds a
/// revision, a write with identical content returns the current revision.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a value, returning its revision.
    async fn put_artifact(&self, key: &ArtifactKey, value: serde_json::Value) -> Result<u32>;

    /// Latest revision, if any.
    async fn latest_artifact(&self, key: &ArtifactKey) -> Result<Option<StoredArtifact>>;

    /// All revisions, oldest first.
    async fn artifact_history(&self, key: &ArtifactKey) -> Result<Vec<StoredArtifact>>;
}

/// Composite storage trait used by the orchestrator.
pub trait PipelineStore: AnalysisCache + ArtifactStore {}

// Blanket implementation: anything implementing both traits is a PipelineStore
impl<T: AnalysisCache + ArtifactStore> PipelineStore for T {}
