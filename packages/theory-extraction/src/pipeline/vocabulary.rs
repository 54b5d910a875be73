//! Exhaustive vocabulary extraction (phase 1).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::call::{CallLayer, Validate};
use super::prompts::{variables, VOCABULARY_EXTRACTION};
use crate::error::Result;
use crate::types::document::TheorySegment;
use crate::types::vocabulary::{Vocabulary, VocabularyTerm};

/// One extracted term as returned by the extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedTerm {
    pub term: String,
    pub definition: String,
    /// Short quotation showing the term in use
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub page_ref: Option<String>,
    /// Category hint (construct, mechanism, actor, ...)
    #[serde(default)]
    pub category: Option<String>,
}

/// Response of the extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VocabularyResponse {
    pub terms: Vec<ExtractedTerm>,
}

impl Validate for VocabularyResponse {
    fn validate(&self) -> std::result::Result<(), String> {
        match self.terms.iter().position(|t| t.term.trim().is_empty()) {
            Some(i) => Err(format!("term {i} has no name")),
            None => Ok(()),
        }
    }
}

impl From<ExtractedTerm> for VocabularyTerm {
    fn from(extracted: ExtractedTerm) -> Self {
        let mut term = VocabularyTerm::new(extracted.term, extracted.definition)
            .with_context(extracted.context);
        term.page_ref = extracted.page_ref.filter(|p| !p.trim().is_empty());
        term.theory_category = extracted.category.filter(|c| !c.trim().is_empty());
        term
    }
}

/// Extracts every term of a theory segment.
///
/// There is no cap on the number of terms. Repeated terms are merged by
/// normalized name, keeping every distinct definition.
pub struct VocabularyExtractor<'a> {
    calls: CallLayer<'a>,
}

impl<'a> VocabularyExtractor<'a> {
    pub fn new(calls: CallLayer<'a>) -> Self {
        Self { calls }
    }

    #[instrument(skip(self, segment), fields(segment_id = %segment.segment_id))]
    pub async fn extract(&self, segment: &TheorySegment) -> Result<Vocabulary> {
        let response: VocabularyResponse = self
            .calls
            .call(
                VOCABULARY_EXTRACTION,
                variables([("segment_text", segment.text.clone())]),
            )
            .await?;

        let extracted = response.terms.len();
        let mut vocabulary = Vocabulary::new(segment.segment_id.clone());
        for term in response.terms {
            vocabulary.insert(term.into());
        }

        debug!(extracted, distinct = vocabulary.len(), "Extracted vocabulary");
        Ok(vocabulary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::prompts::PromptTemplates;
    use crate::stores::MemoryStore;
    use crate::testing::ScriptedClient;
    use crate::types::config::RetryPolicy;
    use crate::types::document::Document;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_extract_merges_variants() {
        let client = ScriptedClient::new().with_json(
            VOCABULARY_EXTRACTION,
            json!({
                "terms": [
                    {"term": "Social Capital", "definition": "resources embedded in networks",
                     "context": "social capital is...", "page_ref": "p. 3", "category": "construct"},
                    {"term": "trust", "definition": "expectation of reliable behaviour"},
                    {"term": "social  capital", "definition": "a public good of the community",
                     "context": "elsewhere, social capital is..."}
                ]
            }),
        );
        let cache = MemoryStore::new();
        let templates = PromptTemplates::new();
        let calls = CallLayer {
            client: &client,
            cache: &cache,
            templates: &templates,
            retry: RetryPolicy::immediate(1),
            cache_ttl: Duration::from_secs(60),
        };
        let segment = TheorySegment::whole(&Document::new("doc", "Social capital and trust."));

        let vocabulary = VocabularyExtractor::new(calls).extract(&segment).await.unwrap();

        assert_eq!(vocabulary.segment_id, "doc#0");
        assert_eq!(vocabulary.len(), 2);
        let capital = vocabulary.get("social capital").unwrap();
        assert_eq!(capital.term, "Social Capital");
        assert_eq!(capital.page_ref.as_deref(), Some("p. 3"));
        assert_eq!(capital.variants.len(), 1);
        assert_eq!(capital.variants[0].definition, "a public good of the community");
    }

    #[test]
    fn test_blank_term_is_invalid() {
        let response = VocabularyResponse {
            terms: vec![ExtractedTerm {
                term: "  ".into(),
                definition: "x".into(),
                context: String::new(),
                page_ref: None,
                category: None,
            }],
        };
        assert!(response.validate().is_err());
    }
}
