//! Ontological classification of vocabulary terms (phase 2).
//!
//! One classification call is issued per segment. Every term gets an
//! assignment: terms the response omits, or all terms when the call fails,
//! are classified by a keyword heuristic. Relationship and action terms always
//! get a domain and range, resolved against the segment's own entities before
//! falling back to the generic `Entity`.

use std::collections::{BTreeMap, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::call::{CallLayer, Validate};
use super::prompts::{variables, ONTOLOGICAL_CLASSIFICATION};
use crate::types::document::TheorySegment;
use crate::types::ontology::{
    AssignmentSource, OntologyAssignment, OntologyCategory, GENERIC_ENTITY,
};
use crate::types::vocabulary::{normalize_term, Vocabulary, VocabularyTerm};

/// One classification returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifiedTerm {
    pub term: String,
    /// One of Entity, Relationship, Property, Action, Measure, Modifier,
    /// TruthValue, Operator
    pub primary_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub domain_type: Option<String>,
    #[serde(default)]
    pub range_type: Option<String>,
}

/// Response of the classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationResponse {
    pub assignments: Vec<ClassifiedTerm>,
}

impl Validate for ClassificationResponse {}

/// What the model said about one term, after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHint {
    pub primary_type: OntologyCategory,
    pub subtype: Option<String>,
    pub domain_type: Option<String>,
    pub range_type: Option<String>,
}

/// Keyword classification used when the model gave no usable answer.
pub fn heuristic_category(term: &VocabularyTerm) -> OntologyCategory {
    use OntologyCategory as C;

    if let Some(hint) = term.theory_category.as_deref() {
        let hint = hint.to_lowercase();
        let by_hint = [
            (&["actor", "agent", "construct", "entity", "concept", "outcome"][..], C::Entity),
            (&["mechanism", "process", "action", "activity"][..], C::Action),
            (&["relation", "relationship", "link"][..], C::Relationship),
            (&["measure", "indicator", "metric", "variable"][..], C::Measure),
            (&["property", "attribute", "characteristic"][..], C::Property),
            (&["moderator", "modifier", "qualifier"][..], C::Modifier),
            (&["condition", "proposition", "hypothesis"][..], C::TruthValue),
            (&["operator", "connective"][..], C::Operator),
        ];
        if let Some((_, category)) = by_hint
            .iter()
            .find(|(keys, _)| keys.iter().any(|k| hint.contains(k)))
        {
            return *category;
        }
    }

    let name = &term.normalized;
    let words: Vec<&str> = name.split(' ').collect();
    let last = words.last().copied().unwrap_or_default();

    if matches!(name.as_str(), "and" | "or" | "not" | "if" | "implies" | "iff" | "xor") {
        return C::Operator;
    }
    if matches!(name.as_str(), "true" | "false") || name.ends_with("condition") {
        return C::TruthValue;
    }
    if words
        .iter()
        .any(|w| matches!(*w, "rate" | "level" | "index" | "score" | "ratio" | "degree" | "count"))
    {
        return C::Measure;
    }
    if words
        .iter()
        .any(|w| matches!(*w, "relationship" | "relation" | "tie" | "link" | "between"))
    {
        return C::Relationship;
    }
    if last.ends_with("ing") && last.len() > 4 {
        return C::Action;
    }
    if last.ends_with("ity") || last.ends_with("ness") {
        return C::Property;
    }
    C::Entity
}

/// Lowercase, punctuation to spaces, padded so whole-word search is `contains`.
fn searchable(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", normalize_term(&cleaned))
}

/// Everything `classify` needs to know about the segment.
#[derive(Debug, Clone, Default)]
pub struct ClassificationContext {
    hints: HashMap<String, ModelHint>,
    /// (normalized, surface form) of the segment's entity terms
    entities: Vec<(String, String)>,
}

impl ClassificationContext {
    /// Build a context from model hints, deciding primary types first so
    /// entities are known before any domain or range is resolved.
    pub fn new(vocabulary: &Vocabulary, hints: HashMap<String, ModelHint>) -> Self {
        let entities = vocabulary
            .iter()
            .filter(|term| {
                let primary = hints
                    .get(&term.normalized)
                    .map(|h| h.primary_type)
                    .unwrap_or_else(|| heuristic_category(term));
                primary == OntologyCategory::Entity
            })
            .map(|term| (term.normalized.clone(), term.term.clone()))
            .collect();
        Self { hints, entities }
    }

    pub fn hint(&self, normalized: &str) -> Option<&ModelHint> {
        self.hints.get(normalized)
    }

    /// Surface forms of the segment's entity terms.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|(_, surface)| surface.as_str())
    }

    fn entity_named(&self, name: &str) -> Option<&str> {
        let wanted = normalize_term(name);
        self.entities
            .iter()
            .find(|(normalized, _)| *normalized == wanted)
            .map(|(_, surface)| surface.as_str())
    }

    /// Entities mentioned in the term's definitions and context, in order of
    /// first mention; longer names first when two start at the same place.
    fn mentioned_entities(&self, term: &VocabularyTerm) -> Vec<&str> {
        let mut text = String::new();
        for definition in term.definitions() {
            text.push_str(definition);
            text.push(' ');
        }
        text.push_str(&term.context_snippet);
        let haystack = searchable(&text);

        let mut found: Vec<(usize, std::cmp::Reverse<usize>, &str)> = self
            .entities
            .iter()
            .filter(|(normalized, _)| *normalized != term.normalized)
            .filter_map(|(normalized, surface)| {
                haystack
                    .find(&searchable(normalized))
                    .map(|pos| (pos, std::cmp::Reverse(normalized.len()), surface.as_str()))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, _, surface)| surface).collect()
    }
}

/// Classifies vocabulary terms into ontological categories.
pub struct OntologyClassifier<'a> {
    calls: CallLayer<'a>,
}

impl<'a> OntologyClassifier<'a> {
    pub fn new(calls: CallLayer<'a>) -> Self {
        Self { calls }
    }

    /// Classify one term against the segment context. Pure.
    pub fn classify(
        &self,
        term: &VocabularyTerm,
        context: &ClassificationContext,
    ) -> OntologyAssignment {
        let hint = context.hint(&term.normalized);
        let (primary_type, source) = match hint {
            Some(h) => (h.primary_type, AssignmentSource::Model),
            None => (heuristic_category(term), AssignmentSource::Heuristic),
        };

        let mut assignment = OntologyAssignment::new(term.normalized.clone(), primary_type);
        assignment.source = source;
        assignment.subtype = hint
            .and_then(|h| h.subtype.clone())
            .filter(|s| !s.trim().is_empty());

        if primary_type.is_relational() {
            let mut mentions = context.mentioned_entities(term).into_iter();
            let hinted_domain = hint
                .and_then(|h| h.domain_type.as_deref())
                .and_then(|name| context.entity_named(name));
            let hinted_range = hint
                .and_then(|h| h.range_type.as_deref())
                .and_then(|name| context.entity_named(name));

            let domain = hinted_domain
                .or_else(|| mentions.next())
                .unwrap_or(GENERIC_ENTITY);
            let range = hinted_range
                .or_else(|| mentions.find(|m| *m != domain))
                .unwrap_or(GENERIC_ENTITY);

            assignment.domain_type = Some(domain.to_string());
            assignment.range_type = Some(range.to_string());
        }

        assignment
    }

    /// Classify a segment's whole vocabulary. Never fails: the mapping is
    /// total, keyed by normalized term.
    #[instrument(skip(self, segment, vocabulary), fields(segment_id = %segment.segment_id, terms = vocabulary.len()))]
    pub async fn classify_all(
        &self,
        segment: &TheorySegment,
        vocabulary: &Vocabulary,
    ) -> BTreeMap<String, OntologyAssignment> {
        let hints = if vocabulary.is_empty() {
            HashMap::new()
        } else {
            self.request_hints(segment, vocabulary).await
        };

        let context = ClassificationContext::new(vocabulary, hints);
        let assignments: BTreeMap<String, OntologyAssignment> = vocabulary
            .iter()
            .map(|term| (term.normalized.clone(), self.classify(term, &context)))
            .collect();

        let heuristic = assignments
            .values()
            .filter(|a| a.source == AssignmentSource::Heuristic)
            .count();
        debug!(classified = assignments.len(), heuristic, "Classified vocabulary");
        assignments
    }

    async fn request_hints(
        &self,
        segment: &TheorySegment,
        vocabulary: &Vocabulary,
    ) -> HashMap<String, ModelHint> {
        let listing = vocabulary
            .iter()
            .map(|t| format!("- {}: {}", t.term, t.definition))
            .collect::<Vec<_>>()
            .join("\n");

        let response: ClassificationResponse = match self
            .calls
            .call(
                ONTOLOGICAL_CLASSIFICATION,
                variables([
                    ("segment_text", segment.text.clone()),
                    ("vocabulary", listing),
                ]),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Classification call failed, using heuristics");
                return HashMap::new();
            }
        };

        let mut hints = HashMap::new();
        for classified in response.assignments {
            let normalized = normalize_term(&classified.term);
            if !vocabulary.contains(&normalized) {
                continue;
            }
            match classified.primary_type.parse::<OntologyCategory>() {
                Ok(primary_type) => {
                    hints.entry(normalized).or_insert(ModelHint {
                        primary_type,
                        subtype: classified.subtype,
                        domain_type: classified.domain_type,
                        range_type: classified.range_type,
                    });
                }
                Err(e) => debug!(term = %classified.term, error = %e, "Ignoring classification"),
            }
        }
        hints
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
    use std::time::Duration;

    fn vocabulary() -> Vocabulary {
        let mut v = Vocabulary::new("doc#0");
        v.insert(VocabularyTerm::new("Citizen", "a member of the community").with_category("actor"));
        v.insert(VocabularyTerm::new("Local Government", "the municipal authority").with_category("actor"));
        v.insert(
            VocabularyTerm::new("Petitioning", "when a citizen asks the local government for action")
                .with_category("process"),
        );
        v.insert(VocabularyTerm::new("Civic Trust", "confidence in institutions"));
        v.insert(VocabularyTerm::new("Influence", "affecting outcomes").with_category("relation"));
        v
    }

    async fn classify_with(client: &ScriptedClient) -> BTreeMap<String, OntologyAssignment> {
        let cache = MemoryStore::new();
        let templates = PromptTemplates::new();
        let calls = CallLayer {
            client,
            cache: &cache,
            templates: &templates,
            retry: RetryPolicy::immediate(1),
            cache_ttl: Duration::from_secs(60),
        };
        let segment = TheorySegment::whole(&Document::new("doc", "Citizens petition government."));
        OntologyClassifier::new(calls)
            .classify_all(&segment, &vocabulary())
            .await
    }

    #[test]
    fn test_heuristic_categories() {
        let cases = [
            (VocabularyTerm::new("Participation Rate", ""), OntologyCategory::Measure),
            (VocabularyTerm::new("Bargaining", ""), OntologyCategory::Action),
            (VocabularyTerm::new("Reciprocity", ""), OntologyCategory::Property),
            (VocabularyTerm::new("Weak Ties", "").with_category("mechanism"), OntologyCategory::Action),
            (VocabularyTerm::new("Household", ""), OntologyCategory::Entity),
            (VocabularyTerm::new("AND", ""), OntologyCategory::Operator),
        ];
        for (term, expected) in cases {
            assert_eq!(heuristic_category(&term), expected, "{}", term.term);
        }
    }

    #[tokio::test]
    async fn test_model_answers_and_heuristic_gaps() {
        let client = ScriptedClient::new().with_json(
            ONTOLOGICAL_CLASSIFICATION,
            json!({
                "assignments": [
                    {"term": "citizen", "primary_type": "Entity", "subtype": "Actor"},
                    {"term": "local government", "primary_type": "Entity"},
                    {"term": "Civic Trust", "primary_type": "property"},
                    {"term": "influence", "primary_type": "Relationship",
                     "domain_type": "Local Government", "range_type": "Citizen"},
                    {"term": "not in vocabulary", "primary_type": "Entity"}
                ]
            }),
        );

        let assignments = classify_with(&client).await;

        assert_eq!(assignments.len(), 5);
        assert_eq!(assignments["civic trust"].primary_type, OntologyCategory::Property);
        assert_eq!(assignments["citizen"].subtype.as_deref(), Some("Actor"));

        let influence = &assignments["influence"];
        assert_eq!(influence.source, AssignmentSource::Model);
        assert_eq!(influence.domain_type.as_deref(), Some("Local Government"));
        assert_eq!(influence.range_type.as_deref(), Some("Citizen"));

        // omitted by the model: heuristic, with domain and range found in its definition
        let petitioning = &assignments["petitioning"];
        assert_eq!(petitioning.source, AssignmentSource::Heuristic);
        assert_eq!(petitioning.primary_type, OntologyCategory::Action);
        assert_eq!(petitioning.domain_type.as_deref(), Some("Citizen"));
        assert_eq!(petitioning.range_type.as_deref(), Some("Local Government"));
    }

    #[tokio::test]
    async fn test_failed_call_still_classifies_every_term() {
        let client = ScriptedClient::new()
            .with_failure(ONTOLOGICAL_CLASSIFICATION, CallError::Service("down".into()));

        let assignments = classify_with(&client).await;

        assert_eq!(assignments.len(), 5);
        assert!(assignments
            .values()
            .all(|a| a.source == AssignmentSource::Heuristic));
        // no entity is mentioned in its definition
        let influence = &assignments["influence"];
        assert_eq!(influence.primary_type, OntologyCategory::Relationship);
        assert_eq!(influence.domain_type.as_deref(), Some(GENERIC_ENTITY));
        assert_eq!(influence.range_type.as_deref(), Some(GENERIC_ENTITY));
    }

    #[tokio::test]
    async fn test_unknown_entity_hint_is_not_trusted() {
        let client = ScriptedClient::new().with_json(
            ONTOLOGICAL_CLASSIFICATION,
            json!({
                "assignments": [
                    {"term": "influence", "primary_type": "Relationship",
                     "domain_type": "Thing", "range_type": "Entity"}
                ]
            }),
        );

        let assignments = classify_with(&client).await;
        let influence = &assignments["influence"];
        assert_eq!(influence.domain_type.as_deref(), Some(GENERIC_ENTITY));
        assert_eq!(influence.range_type.as_deref(), Some(GENERIC_ENTITY));
    }
}
