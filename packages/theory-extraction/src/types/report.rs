//! Per-document run reports.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::routing::{ManualReviewReason, RoutingDecision};
use super::schema::SchemaBlueprint;

/// Terminal status of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    Completed,
    ManualReview { reason: ManualReviewReason },
    Failed { error: String },
}

impl SegmentStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, SegmentStatus::Completed)
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentStatus::Completed => f.write_str("completed"),
            SegmentStatus::ManualReview { reason } => write!(f, "manual_review: {reason}"),
            SegmentStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// What happened to one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub segment_id: String,
    pub status: SegmentStatus,
    /// Number of distinct vocabulary terms extracted (0 if extraction never finished)
    pub vocabulary_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RoutingDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<SchemaBlueprint>,
    /// Stored revision of the blueprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
}

impl SegmentReport {
    pub fn new(segment_id: impl Into<String>, status: SegmentStatus) -> Self {
        Self {
            segment_id: segment_id.into(),
            status,
            vocabulary_size: 0,
            decision: None,
            blueprint: None,
            revision: None,
        }
    }
}

/// Result of running the pipeline over one document. Always produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub run_id: Uuid,
    pub document_id: String,
    pub segmentation_degraded: bool,
    /// In segment order
    pub segments: Vec<SegmentReport>,
}

impl DocumentReport {
    pub fn completed(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments.iter().filter(|s| s.status.is_completed())
    }

    pub fn needs_review(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|s| matches!(s.status, SegmentStatus::ManualReview { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|s| matches!(s.status, SegmentStatus::Failed { .. }))
    }
}
