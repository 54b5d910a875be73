//! Confidence integration: detector scores to a routing decision.
//!
//! The rule is a pure function of the score set and the configuration, so
//! identical scores always route identically regardless of the order in which
//! detectors finished.
//!
//! 1. Rank scores by confidence (ties broken by canonical model-type order).
//! 2. A top score at or above the high threshold that leads the runner-up by
//!    at least the separation margin means `single`.
//! 3. Otherwise, walk the ranking and keep every detector at or above the
//!    hybrid threshold that is compatible with all detectors kept so far. Two
//!    or more kept means `hybrid`.
//! 4. Anything else is `manual_review`.
//!
//! A top score sitting exactly on the high threshold is a tie between single
//! and hybrid; when a hybrid is available it wins.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::types::config::RoutingThresholds;
use crate::types::model_type::{CompatibilityMatrix, ModelType};
use crate::types::routing::{DetectorScore, ManualReviewReason, RoutingDecision};

/// Absorbs float noise in threshold comparisons (0.85 - 0.70 is not
/// exactly 0.15).
const EPSILON: f64 = 1e-9;

fn at_least(value: f64, threshold: f64) -> bool {
    value + EPSILON >= threshold
}

/// Best finite score per detector, ranked highest first.
fn ranked(scores: &[DetectorScore]) -> Vec<(ModelType, f64)> {
    let mut best: BTreeMap<ModelType, f64> = BTreeMap::new();
    for score in scores.iter().filter(|s| s.confidence.is_finite()) {
        let confidence = score.confidence.clamp(0.0, 1.0);
        best.entry(score.detector_name)
            .and_modify(|c| *c = c.max(confidence))
            .or_insert(confidence);
    }

    let mut ranked: Vec<(ModelType, f64)> = best.into_iter().collect();
    ranked.sort_by(|(ta, ca), (tb, cb)| {
        cb.partial_cmp(ca).unwrap_or(Ordering::Equal).then(ta.cmp(tb))
    });
    ranked
}

/// Combines detector scores into a routing decision.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceIntegrator {
    thresholds: RoutingThresholds,
    compatibility: CompatibilityMatrix,
}

impl ConfidenceIntegrator {
    pub fn new(thresholds: RoutingThresholds, compatibility: CompatibilityMatrix) -> Self {
        Self {
            thresholds,
            compatibility,
        }
    }

    pub fn thresholds(&self) -> &RoutingThresholds {
        &self.thresholds
    }

    /// Route a segment. Scores for other segments must not be passed in.
    pub fn integrate(&self, segment_id: &str, scores: &[DetectorScore]) -> RoutingDecision {
        let decision = self.decide(segment_id, &ranked(scores));
        debug!(
            segment_id,
            mode = ?decision.mode,
            chosen = ?decision.chosen_model_types,
            "Routing decision"
        );
        decision
    }

    fn decide(&self, segment_id: &str, ranked: &[(ModelType, f64)]) -> RoutingDecision {
        let t = &self.thresholds;
        let Some(&(top_type, top)) = ranked.first() else {
            return RoutingDecision::manual_review(segment_id, ManualReviewReason::NoScores);
        };

        let second = ranked.get(1).map_or(0.0, |(_, c)| *c);
        let single = at_least(top, t.high_threshold) && at_least(top - second, t.separation_margin);
        let on_boundary = (top - t.high_threshold).abs() <= EPSILON;

        let qualifying: Vec<ModelType> = ranked
            .iter()
            .filter(|(_, c)| at_least(*c, t.hybrid_threshold))
            .map(|(m, _)| *m)
            .collect();

        let mut chosen: Vec<ModelType> = Vec::new();
        for candidate in &qualifying {
            if chosen
                .iter()
                .all(|kept| self.compatibility.compatible(*kept, *candidate))
            {
                chosen.push(*candidate);
            }
        }
        let hybrid = chosen.len() >= 2;

        if single && !(on_boundary && hybrid) {
            return RoutingDecision::single(segment_id, top_type);
        }
        if hybrid {
            return RoutingDecision::hybrid(segment_id, chosen);
        }

        let reason = if qualifying.len() >= 2 {
            ManualReviewReason::IncompatibleStructures
        } else if at_least(top, t.high_threshold) {
            ManualReviewReason::InsufficientSeparation
        } else {
            ManualReviewReason::BelowHybridThreshold
        };
        RoutingDecision::manual_review(segment_id, reason)
    }
}
