//! Schema fragment generation (phase 3).

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::call::{CallLayer, Validate};
use super::prompts::{variables, SCHEMA_GENERATION};
use crate::error::Result;
use crate::types::document::TheorySegment;
use crate::types::model_type::ModelType;
use crate::types::ontology::{OntologyAssignment, OntologyCategory};
use crate::types::schema::{EdgeType, NodeType, SchemaFragment};
use crate::types::vocabulary::{normalize_term, Vocabulary};

/// Inputs of one generation (or repair) call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'r> {
    pub segment: &'r TheorySegment,
    pub model_type: ModelType,
    pub vocabulary: &'r Vocabulary,
    pub assignments: &'r BTreeMap<String, OntologyAssignment>,
    /// Terms a previous pass left out; empty on the first pass
    pub missing_terms: &'r [String],
    /// 0 for the first pass, then 1, 2, ... for each repair pass
    pub repair_attempt: u32,
}

/// Produces a schema fragment of one model type for a segment.
#[async_trait]
pub trait SchemaGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<SchemaFragment>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeTypeSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Attribute names; vocabulary terms may appear here
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdgeTypeSpec {
    pub name: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TermRoleSpec {
    pub term: String,
    /// Ontological role the term plays in this schema
    pub role: String,
}

/// Response of the schema generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaResponse {
    pub title: String,
    #[serde(default)]
    pub node_types: Vec<NodeTypeSpec>,
    #[serde(default)]
    pub edge_types: Vec<EdgeTypeSpec>,
    /// Every vocabulary term with the role it plays
    #[serde(default)]
    pub definitions: Vec<TermRoleSpec>,
}

impl Validate for SchemaResponse {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.node_types.iter().any(|n| n.name.trim().is_empty()) {
            return Err("node type without a name".into());
        }
        if self.edge_types.iter().any(|e| e.name.trim().is_empty()) {
            return Err("edge type without a name".into());
        }
        Ok(())
    }
}

impl SchemaResponse {
    /// Convert into a fragment. A role that does not parse falls back to the
    /// term's ontological assignment; terms with neither are left out.
    pub fn into_fragment(
        self,
        model_type: ModelType,
        assignments: &BTreeMap<String, OntologyAssignment>,
    ) -> SchemaFragment {
        let component = model_type.as_str().to_string();
        let mut fragment = SchemaFragment::new(model_type, self.title);

        fragment.node_types = self
            .node_types
            .into_iter()
            .map(|n| NodeType {
                name: n.name.trim().to_string(),
                component: component.clone(),
                description: n.description,
                properties: n.properties,
            })
            .collect();

        fragment.edge_types = self
            .edge_types
            .into_iter()
            .map(|e| EdgeType {
                name: e.name.trim().to_string(),
                component: component.clone(),
                source: e.source,
                target: e.target,
                description: e.description,
            })
            .collect();

        for spec in self.definitions {
            let normalized = normalize_term(&spec.term);
            if normalized.is_empty() {
                continue;
            }
            let role = spec
                .role
                .parse::<OntologyCategory>()
                .ok()
                .or_else(|| assignments.get(&normalized).map(|a| a.primary_type));
            if let Some(role) = role {
                fragment.term_roles.insert(normalized, role);
            }
        }

        fragment
    }
}

/// Vocabulary listing with classifications, one term per line.
pub fn describe_vocabulary(
    vocabulary: &Vocabulary,
    assignments: &BTreeMap<String, OntologyAssignment>,
) -> String {
    vocabulary
        .iter()
        .map(|term| match assignments.get(&term.normalized) {
            Some(a) => match (&a.domain_type, &a.range_type) {
                (Some(d), Some(r)) => {
                    format!("- {} [{}: {} -> {}]: {}", term.term, a.primary_type, d, r, term.definition)
                }
                _ => format!("- {} [{}]: {}", term.term, a.primary_type, term.definition),
            },
            None => format!("- {}: {}", term.term, term.definition),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Repair instructions. The pass number is part of the prompt, so every
/// pass is a distinct cache entry and reaches the completion service.
fn missing_terms_section(missing_terms: &[String], repair_attempt: u32) -> String {
    if missing_terms.is_empty() && repair_attempt == 0 {
        return String::new();
    }
    let list = missing_terms
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Repair pass {repair_attempt}. The previous schema omitted these terms. \
         Include every one of them:\n{list}"
    )
}

/// Generates fragments through the completion service.
pub struct LlmSchemaGenerator<'a> {
    calls: CallLayer<'a>,
}

impl<'a> LlmSchemaGenerator<'a> {
    pub fn new(calls: CallLayer<'a>) -> Self {
        Self { calls }
    }
}

#[async_trait]
impl SchemaGenerator for LlmSchemaGenerator<'_> {
    #[instrument(skip(self, request), fields(segment_id = %request.segment.segment_id, model_type = %request.model_type, missing = request.missing_terms.len(), repair_attempt = request.repair_attempt))]
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<SchemaFragment> {
        let response: SchemaResponse = self
            .calls
            .call(
                SCHEMA_GENERATION,
                variables([
                    ("model_type", request.model_type.as_str().to_string()),
                    ("segment_text", request.segment.text.clone()),
                    (
                        "vocabulary",
                        describe_vocabulary(request.vocabulary, request.assignments),
                    ),
                    (
                        "missing_terms_section",
                        missing_terms_section(request.missing_terms, request.repair_attempt),
                    ),
                ]),
            )
            .await?;

        let fragment = response.into_fragment(request.model_type, request.assignments);
        debug!(
            nodes = fragment.node_types.len(),
            edges = fragment.edge_types.len(),
            roles = fragment.term_roles.len(),
            "Generated fragment"
        );
        Ok(fragment)
    }
}
