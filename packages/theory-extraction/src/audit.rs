//! Append-only audit trail for human review.
//!
//! Every routing decision, repair pass, cross-model conflict and dropped term
//! is recorded here. Manual-review segments are resolved by reading this log.
//!
//! # Usage
//!
//! ```ignore
//! let report = orchestrator.run(&document).await;
//! for entry in orchestrator.audit().entries_for_segment("paper#1") {
//!     println!("{} {:?}", entry.sequence, entry.event);
//! }
//! ```

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ontology::OntologyCategory;
use crate::types::routing::RoutingDecision;

/// What was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Segmenter fell back to one whole-document segment
    SegmentationDegraded { document_id: String, reason: String },

    /// A detector exhausted its retries and contributed no score
    DetectorFailed {
        segment_id: String,
        detector: String,
        error: String,
    },

    Routing { decision: RoutingDecision },

    /// A chosen model type produced no fragment; its component is absent
    FragmentFailed {
        segment_id: String,
        model_type: String,
        error: String,
    },

    /// One schema re-generation pass
    RepairAttempt {
        segment_id: String,
        attempt: u32,
        missing_before: Vec<String>,
        missing_after: Vec<String>,
    },

    /// Two fragments gave one term different roles; all roles were kept
    CrossModelConflict {
        segment_id: String,
        term: String,
        roles: Vec<OntologyCategory>,
    },

    /// Terms that did not make it into any schema
    TermsDropped {
        segment_id: String,
        terms: Vec<String>,
        reason: String,
    },

    /// The document deadline cut the segment short
    SegmentTimedOut { segment_id: String },
}

impl AuditEvent {
    /// Segment this event concerns, if any.
    pub fn segment_id(&self) -> Option<&str> {
        match self {
            AuditEvent::SegmentationDegraded { .. } => None,
            AuditEvent::Routing { decision } => Some(&decision.segment_id),
            AuditEvent::DetectorFailed { segment_id, .. }
            | AuditEvent::FragmentFailed { segment_id, .. }
            | AuditEvent::RepairAttempt { segment_id, .. }
            | AuditEvent::CrossModelConflict { segment_id, .. }
            | AuditEvent::TermsDropped { segment_id, .. }
            | AuditEvent::SegmentTimedOut { segment_id } => Some(segment_id),
        }
    }
}

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Thread-safe, append-only audit log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    /// Create a new empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns its sequence number.
    pub fn record(&self, event: AuditEvent) -> u64 {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequence = entries.len() as u64;
        entries.push(AuditEntry {
            sequence,
            recorded_at: Utc::now(),
            event,
        });
        sequence
    }

    /// Snapshot of all entries in order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Entries concerning one segment.
    pub fn entries_for_segment(&self, segment_id: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event.segment_id() == Some(segment_id))
            .collect()
    }

    /// Terms recorded as dropped for a segment.
    pub fn dropped_terms(&self, segment_id: &str) -> Vec<String> {
        self.entries_for_segment(segment_id)
            .into_iter()
            .filter_map(|e| match e.event {
                AuditEvent::TermsDropped { terms, .. } => Some(terms),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole log as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }
}
