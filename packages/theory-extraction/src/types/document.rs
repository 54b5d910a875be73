//! Documents and the theory segments carved out of them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A paper as handed over by ingestion. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned identifier
    pub id: String,

    /// Plain text body
    pub text: String,

    /// Bibliographic citation, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,

    /// Where the text was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl Document {
    /// Create a new document.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            citation: None,
            source_path: None,
        }
    }

    /// Set the citation.
    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    /// Set the source path.
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Length in characters (spans are expressed in characters).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Text covered by a character span, or `None` when out of range.
    pub fn slice(&self, span: Span) -> Option<&str> {
        if span.start > span.end {
            return None;
        }
        let start = char_to_byte(&self.text, span.start)?;
        let end = char_to_byte(&self.text, span.end)?;
        self.text.get(start..end)
    }
}

fn char_to_byte(text: &str, char_idx: usize) -> Option<usize> {
    if char_idx == 0 {
        return Some(0);
    }
    match text.char_indices().nth(char_idx) {
        Some((byte, _)) => Some(byte),
        None if text.chars().count() == char_idx => Some(text.len()),
        None => None,
    }
}

/// Half-open character range `[start, end)` within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A contiguous span of a document believed to express one theory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheorySegment {
    /// `<document id>#<index>`, stable across runs
    pub segment_id: String,

    pub parent_document_id: String,

    pub span: Span,

    /// Theory name suggested by the segmenter, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The text covered by `span`
    pub text: String,
}

impl TheorySegment {
    /// Build the segment for `span` of `document`. Returns `None` when the
    /// span does not fit inside the document.
    pub fn from_span(
        document: &Document,
        index: usize,
        span: Span,
        title: Option<String>,
    ) -> Option<Self> {
        let text = document.slice(span)?.to_string();
        Some(Self {
            segment_id: format!("{}#{}", document.id, index),
            parent_document_id: document.id.clone(),
            span,
            title,
            text,
        })
    }

    /// One segment covering the whole document.
    pub fn whole(document: &Document) -> Self {
        Self {
            segment_id: format!("{}#0", document.id),
            parent_document_id: document.id.clone(),
            span: Span::new(0, document.char_len()),
            title: None,
            text: document.text.clone(),
        }
    }

    /// Hash of the segment text, used for cache keys.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Output of the segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    /// Never empty
    pub segments: Vec<TheorySegment>,

    /// True when the segmenter fell back to a whole-document segment
    /// because the call failed or returned inconsistent boundaries.
    pub segmentation_degraded: bool,

    /// Why segmentation degraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl Segmentation {
    /// The degraded fallback: exactly one whole-document segment.
    pub fn degraded(document: &Document, reason: impl Into<String>) -> Self {
        Self {
            segments: vec![TheorySegment::whole(document)],
            segmentation_degraded: true,
            degraded_reason: Some(reason.into()),
        }
    }
}
