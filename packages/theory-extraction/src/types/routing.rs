//! Detector scores and the routing decisions derived from them.

use serde::{Deserialize, Serialize};

use super::model_type::ModelType;

/// One detector's fit score for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorScore {
    pub detector_name: ModelType,
    pub segment_id: String,
    /// In `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
}

impl DetectorScore {
    pub fn new(detector_name: ModelType, segment_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            detector_name,
            segment_id: segment_id.into(),
            confidence,
            supporting_evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.supporting_evidence = evidence.into_iter().map(Into::into).collect();
        self
    }
}

/// How a segment proceeds after detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Single,
    Hybrid,
    ManualReview,
}

/// Why a segment needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualReviewReason {
    /// Every detector failed or none ran
    NoScores,
    /// No detector cleared the hybrid threshold, and none was decisive
    BelowHybridThreshold,
    /// The top detector was strong but not separated from the runner-up
    InsufficientSeparation,
    /// Several detectors qualified but their structures exclude each other
    IncompatibleStructures,
    /// The document deadline expired before the segment finished
    Timeout,
    /// Schema assembly could not cover every term
    SchemaIncomplete { missing_terms: Vec<String> },
}

impl std::fmt::Display for ManualReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoScores => f.write_str("no detector scores"),
            Self::BelowHybridThreshold => f.write_str("no detector above hybrid threshold"),
            Self::InsufficientSeparation => f.write_str("top detector not separated from runner-up"),
            Self::IncompatibleStructures => f.write_str("qualifying structures are mutually exclusive"),
            Self::Timeout => f.write_str("timeout"),
            Self::SchemaIncomplete { missing_terms } => {
                write!(f, "schema incomplete: missing {}", missing_terms.join(", "))
            }
        }
    }
}

/// The routing decision for one segment. A pure function of its scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub segment_id: String,
    pub mode: RoutingMode,
    /// Ranked by score, highest first; empty for manual review
    pub chosen_model_types: Vec<ModelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ManualReviewReason>,
}

impl RoutingDecision {
    pub fn single(segment_id: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            segment_id: segment_id.into(),
            mode: RoutingMode::Single,
            chosen_model_types: vec![model_type],
            reason: None,
        }
    }

    pub fn hybrid(segment_id: impl Into<String>, model_types: Vec<ModelType>) -> Self {
        Self {
            segment_id: segment_id.into(),
            mode: RoutingMode::Hybrid,
            chosen_model_types: model_types,
            reason: None,
        }
    }

    pub fn manual_review(segment_id: impl Into<String>, reason: ManualReviewReason) -> Self {
        Self {
            segment_id: segment_id.into(),
            mode: RoutingMode::ManualReview,
            chosen_model_types: Vec::new(),
            reason: Some(reason),
        }
    }

    /// The highest-ranked chosen model type.
    pub fn primary(&self) -> Option<ModelType> {
        self.chosen_model_types.first().copied()
    }
}
