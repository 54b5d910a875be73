//! The ensemble of specialized model-type detectors.
//!
//! Each detector independently scores how well a segment fits its structural
//! pattern. Detectors run concurrently over the same immutable segment and all
//! of them finish (or fail) before the ensemble returns: that join is the
//! barrier in front of the confidence integrator.

use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::call::{CallLayer, Validate};
use super::prompts::variables;
use crate::error::Result;
use crate::types::document::TheorySegment;
use crate::types::model_type::ModelType;
use crate::types::routing::DetectorScore;

/// Response of one detector call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResponse {
    /// Fit between 0.0 and 1.0
    pub confidence: f64,
    /// Passages supporting the score
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Validate for DetectionResponse {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence) {
            Ok(())
        } else {
            Err(format!("confidence {} outside [0, 1]", self.confidence))
        }
    }
}

/// A detector that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorFailure {
    pub detector: ModelType,
    pub error: String,
}

/// Everything the ensemble produced for one segment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnsembleOutcome {
    /// In detector order
    pub scores: Vec<DetectorScore>,
    pub failures: Vec<DetectorFailure>,
}

/// Scores a segment against one structural pattern.
#[derive(Clone, Copy)]
pub struct ModelTypeDetector<'a> {
    model_type: ModelType,
    calls: CallLayer<'a>,
}

impl<'a> ModelTypeDetector<'a> {
    pub fn new(model_type: ModelType, calls: CallLayer<'a>) -> Self {
        Self { model_type, calls }
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub async fn detect(&self, segment: &TheorySegment) -> Result<DetectorScore> {
        let response: DetectionResponse = self
            .calls
            .call(
                &self.model_type.detector_template_id(),
                variables([("segment_text", segment.text.clone())]),
            )
            .await?;

        Ok(
            DetectorScore::new(self.model_type, segment.segment_id.clone(), response.confidence)
                .with_evidence(response.evidence),
        )
    }
}

/// Runs a set of detectors concurrently.
pub struct DetectorEnsemble<'a> {
    detectors: Vec<ModelTypeDetector<'a>>,
}

impl<'a> DetectorEnsemble<'a> {
    /// One detector per model type.
    pub fn new(calls: CallLayer<'a>) -> Self {
        Self::with_model_types(calls, ModelType::ALL)
    }

    /// Only the given detectors.
    pub fn with_model_types(
        calls: CallLayer<'a>,
        model_types: impl IntoIterator<Item = ModelType>,
    ) -> Self {
        Self {
            detectors: model_types
                .into_iter()
                .map(|t| ModelTypeDetector::new(t, calls))
                .collect(),
        }
    }

    pub fn model_types(&self) -> impl Iterator<Item = ModelType> + '_ {
        self.detectors.iter().map(|d| d.model_type())
    }

    /// Run every detector and wait for all of them.
    ///
    /// A failed detector contributes no score; it is reported in `failures`.
    #[instrument(skip(self, segment), fields(segment_id = %segment.segment_id))]
    pub async fn detect_all(&self, segment: &TheorySegment) -> EnsembleOutcome {
        let futures = self.detectors.iter().map(|d| d.detect(segment));
        let results = join_all(futures).await;

        let mut outcome = EnsembleOutcome::default();
        for (detector, result) in self.detectors.iter().zip(results) {
            match result {
                Ok(score) => {
                    debug!(detector = %detector.model_type(), confidence = score.confidence, "Detector scored");
                    outcome.scores.push(score);
                }
                Err(e) => {
                    warn!(detector = %detector.model_type(), error = %e, "Detector failed");
                    outcome.failures.push(DetectorFailure {
                        detector: detector.model_type(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::pipeline::prompts::PromptTemplates;
    use crate::stores::MemoryStore;
    use crate::testing::ScriptedClient;
    use crate::types::config::RetryPolicy;
    use crate::types::document::Document;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn calls<'a>(
        client: &'a ScriptedClient,
        cache: &'a MemoryStore,
        templates: &'a PromptTemplates,
    ) -> CallLayer<'a> {
        CallLayer {
            client,
            cache,
            templates,
            retry: RetryPolicy::immediate(2),
            cache_ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_failed_detector_contributes_no_score() {
        let client = ScriptedClient::new()
            .with_json("detect_sequence", json!({"confidence": 0.9, "evidence": ["stages"]}))
            .with_json("detect_property_graph", json!({"confidence": 0.4}))
            .with_json("detect_logical", json!({"confidence": 1.5}))
            .with_failure("detect_hypergraph", CallError::Service("down".into()));
        let cache = MemoryStore::new();
        let templates = PromptTemplates::new();
        let ensemble = DetectorEnsemble::with_model_types(
            calls(&client, &cache, &templates),
            [
                ModelType::PropertyGraph,
                ModelType::Sequence,
                ModelType::Logical,
                ModelType::Hypergraph,
            ],
        );
        let segment = TheorySegment::whole(&Document::new("doc", "Three stages."));

        let outcome = ensemble.detect_all(&segment).await;

        let scored: Vec<_> = outcome.scores.iter().map(|s| s.detector_name).collect();
        assert_eq!(scored, vec![ModelType::PropertyGraph, ModelType::Sequence]);
        assert_eq!(outcome.scores[1].supporting_evidence, vec!["stages"]);
        let failed: Vec<_> = outcome.failures.iter().map(|f| f.detector).collect();
        assert_eq!(failed, vec![ModelType::Logical, ModelType::Hypergraph]);
        // out-of-range confidence is malformed and retried
        assert_eq!(client.call_count("detect_logical"), 2);
        assert_eq!(client.call_count("detect_hypergraph"), 1);
    }

    #[tokio::test]
    async fn test_detectors_run_concurrently() {
        let mut client = ScriptedClient::new().with_latency(Duration::from_millis(50));
        for model_type in ModelType::ALL {
            client = client.with_json(model_type.detector_template_id(), json!({"confidence": 0.5}));
        }
        let cache = MemoryStore::new();
        let templates = PromptTemplates::new();
        let ensemble = DetectorEnsemble::new(calls(&client, &cache, &templates));
        let segment = TheorySegment::whole(&Document::new("doc", "text"));

        let started = Instant::now();
        let outcome = ensemble.detect_all(&segment).await;

        assert_eq!(outcome.scores.len(), 6);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
