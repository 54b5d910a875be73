//! Vocabulary terms extracted from a theory segment.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Case-fold and collapse whitespace. Two terms are the same term iff their
/// normalized forms are equal.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// An alternative definition of a term that recurred in the same segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVariant {
    pub definition: String,
    pub context_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ref: Option<String>,
}

/// One vocabulary term. Keyed by `(segment_id, normalized)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyTerm {
    /// Surface form as first seen
    pub term: String,

    pub normalized: String,

    pub definition: String,

    pub context_snippet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ref: Option<String>,

    /// Category hint from the extractor (e.g. "construct", "mechanism")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theory_category: Option<String>,

    /// Conflicting definitions seen for the same normalized term
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<TermVariant>,
}

impl VocabularyTerm {
    /// Create a new term.
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        let term = term.into();
        Self {
            normalized: normalize_term(&term),
            term,
            definition: definition.into(),
            context_snippet: String::new(),
            page_ref: None,
            theory_category: None,
            variants: Vec::new(),
        }
    }

    /// Set the context snippet.
    pub fn with_context(mut self, snippet: impl Into<String>) -> Self {
        self.context_snippet = snippet.into();
        self
    }

    /// Set the page reference.
    pub fn with_page_ref(mut self, page_ref: impl Into<String>) -> Self {
        self.page_ref = Some(page_ref.into());
        self
    }

    /// Set the theory category hint.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.theory_category = Some(category.into());
        self
    }

    /// Every definition this term carries, primary first.
    pub fn definitions(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.definition.as_str())
            .chain(self.variants.iter().map(|v| v.definition.as_str()))
    }

    fn has_definition(&self, definition: &str) -> bool {
        let wanted = normalize_term(definition);
        self.definitions().any(|d| normalize_term(d) == wanted)
    }
}

/// Deduplicated vocabulary of one segment, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub segment_id: String,
    terms: IndexMap<String, VocabularyTerm>,
}

impl Vocabulary {
    /// Create an empty vocabulary for a segment.
    pub fn new(segment_id: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            terms: IndexMap::new(),
        }
    }

    /// Build a segment's vocabulary from extracted terms.
    pub fn from_terms(
        segment_id: impl Into<String>,
        terms: impl IntoIterator<Item = VocabularyTerm>,
    ) -> Self {
        let mut vocabulary = Self::new(segment_id);
        vocabulary.extend(terms);
        vocabulary
    }

    /// Insert a term, merging with an existing entry of the same normalized
    /// name. A differing definition is kept as a variant, never overwritten.
    ///
    /// Returns false when the term has no name after normalization.
    pub fn insert(&mut self, term: VocabularyTerm) -> bool {
        let key = normalize_term(&term.term);
        if key.is_empty() {
            return false;
        }

        match self.terms.get_mut(&key) {
            Some(existing) => {
                if existing.page_ref.is_none() {
                    existing.page_ref = term.page_ref.clone();
                }
                if existing.theory_category.is_none() {
                    existing.theory_category = term.theory_category.clone();
                }
                let incoming = std::iter::once(TermVariant {
                    definition: term.definition,
                    context_snippet: term.context_snippet,
                    page_ref: term.page_ref,
                })
                .chain(term.variants);
                for variant in incoming {
                    if !existing.has_definition(&variant.definition) {
                        existing.variants.push(variant);
                    }
                }
            }
            None => {
                let mut term = term;
                term.normalized = key.clone();
                self.terms.insert(key, term);
            }
        }
        true
    }

    pub fn get(&self, normalized: &str) -> Option<&VocabularyTerm> {
        self.terms.get(normalized)
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.terms.contains_key(normalized)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VocabularyTerm> {
        self.terms.values()
    }

    /// Normalized names in first-seen order.
    pub fn normalized_terms(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(|k| k.as_str())
    }
}

impl Extend<VocabularyTerm> for Vocabulary {
    fn extend<I: IntoIterator<Item = VocabularyTerm>>(&mut self, iter: I) {
        for term in iter {
            self.insert(term);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  Social\n  Capital "), "social capital");
        assert_eq!(normalize_term("TRUST"), "trust");
        assert_eq!(normalize_term("   "), "");
    }

    #[test]
    fn test_from_terms_keeps_segment_id() {
        let vocab = Vocabulary::from_terms(
            "paper#1",
            [
                VocabularyTerm::new("Trust", "reliance"),
                VocabularyTerm::new("trust", "confidence"),
            ],
        );
        assert_eq!(vocab.segment_id, "paper#1");
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.get("trust").unwrap().variants.len(), 1);
    }

    #[test]
    fn test_duplicate_terms_collapse() {
        let mut vocab = Vocabulary::new("s");
        vocab.insert(VocabularyTerm::new("Social Capital", "Resources embedded in networks"));
        vocab.insert(VocabularyTerm::new("social  capital", "resources embedded in networks"));
        assert_eq!(vocab.len(), 1);
        assert!(vocab.get("social capital").unwrap().variants.is_empty());
    }

    #[test]
    fn test_conflicting_definitions_are_kept_as_variants() {
        let mut vocab = Vocabulary::new("s");
        vocab.insert(VocabularyTerm::new("Trust", "Expectation of reciprocity"));
        vocab.insert(
            VocabularyTerm::new("trust", "Willingness to be vulnerable").with_page_ref("p. 12"),
        );
        vocab.insert(VocabularyTerm::new("TRUST", "Expectation of reciprocity"));

        let term = vocab.get("trust").unwrap();
        assert_eq!(term.definition, "Expectation of reciprocity");
        assert_eq!(term.variants.len(), 1);
        assert_eq!(term.variants[0].definition, "Willingness to be vulnerable");
        assert_eq!(term.page_ref.as_deref(), Some("p. 12"));
    }

    #[test]
    fn test_blank_terms_rejected() {
        let mut vocab = Vocabulary::new("s");
        assert!(!vocab.insert(VocabularyTerm::new("  ", "nothing")));
        assert!(vocab.is_empty());
    }
}
