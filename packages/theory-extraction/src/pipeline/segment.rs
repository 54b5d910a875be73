//! Theory count detection and boundary segmentation.
//!
//! One phase-0 call returns the number of theories and their character spans.
//! Any failure, or a boundary set that does not fit the document, degrades to
//! a single whole-document segment rather than aborting the run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::call::{CallLayer, Validate};
use super::prompts::{variables, SEGMENTATION};
use crate::types::document::{Document, Segmentation, Span, TheorySegment};

/// One theory boundary returned by the segmentation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TheoryBoundary {
    /// Name of the theory, if the text gives one
    #[serde(default)]
    pub title: Option<String>,
    /// Start character offset (inclusive)
    pub start: usize,
    /// End character offset (exclusive)
    pub end: usize,
}

/// Response of the segmentation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationResponse {
    pub theory_count: usize,
    #[serde(default)]
    pub theories: Vec<TheoryBoundary>,
}

impl Validate for SegmentationResponse {
    fn validate(&self) -> Result<(), String> {
        if self.theory_count != self.theories.len() {
            return Err(format!(
                "theory_count is {} but {} boundaries were given",
                self.theory_count,
                self.theories.len()
            ));
        }
        Ok(())
    }
}

/// Turn boundaries into segments, or explain why they are unusable.
///
/// Boundaries are ordered by start offset; segment indices follow that order.
pub fn segments_from_boundaries(
    document: &Document,
    boundaries: &[TheoryBoundary],
) -> Result<Vec<TheorySegment>, String> {
    let mut ordered: Vec<&TheoryBoundary> = boundaries.iter().collect();
    ordered.sort_by_key(|b| (b.start, b.end));

    let doc_len = document.char_len();
    let mut segments = Vec::with_capacity(ordered.len());
    let mut previous: Option<Span> = None;

    for (index, boundary) in ordered.into_iter().enumerate() {
        let span = Span::new(boundary.start, boundary.end);
        if span.start >= span.end {
            return Err(format!("empty span {}..{}", span.start, span.end));
        }
        if span.end > doc_len {
            return Err(format!(
                "span {}..{} exceeds document length {doc_len}",
                span.start, span.end
            ));
        }
        if let Some(prev) = previous {
            if prev.overlaps(&span) {
                return Err(format!(
                    "spans {}..{} and {}..{} overlap",
                    prev.start, prev.end, span.start, span.end
                ));
            }
        }
        let title = boundary
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let segment = TheorySegment::from_span(document, index, span, title)
            .ok_or_else(|| format!("span {}..{} is out of range", span.start, span.end))?;
        segments.push(segment);
        previous = Some(span);
    }

    Ok(segments)
}

/// Splits a document into theory segments.
pub struct TheorySegmenter<'a> {
    calls: CallLayer<'a>,
}

impl<'a> TheorySegmenter<'a> {
    pub fn new(calls: CallLayer<'a>) -> Self {
        Self { calls }
    }

    /// Segment a document. Always returns at least one segment.
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn segment(&self, document: &Document) -> Segmentation {
        let vars = variables([
            ("char_count", document.char_len().to_string()),
            ("document_text", document.text.clone()),
        ]);

        let response = match self
            .calls
            .call::<SegmentationResponse>(SEGMENTATION, vars)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Segmentation call failed, using whole document");
                return Segmentation::degraded(document, e.to_string());
            }
        };

        // No boundary detected: one segment, nothing went wrong.
        if response.theories.is_empty() {
            return Segmentation {
                segments: vec![TheorySegment::whole(document)],
                segmentation_degraded: false,
                degraded_reason: None,
            };
        }

        match segments_from_boundaries(document, &response.theories) {
            Ok(segments) => {
                info!(theory_count = segments.len(), "Segmented document");
                Segmentation {
                    segments,
                    segmentation_degraded: false,
                    degraded_reason: None,
                }
            }
            Err(reason) => {
                warn!(reason = %reason, "Inconsistent boundaries, using whole document");
                Segmentation::degraded(document, reason)
            }
        }
    }
}
