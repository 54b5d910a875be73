//! Schema fragments, composed schemas and the final blueprint.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model_type::ModelType;
use super::ontology::{OntologyAssignment, OntologyCategory};
use super::vocabulary::{normalize_term, Vocabulary, VocabularyTerm};
use crate::error::{PipelineError, Result};

/// A node (or row, stage, variable...) type in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    /// Sub-structure this type belongs to
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

/// An edge (or transition, column relation...) type in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeType {
    pub name: String,
    #[serde(default)]
    pub component: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// Schema output of one generation call for one model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFragment {
    pub model_type: ModelType,
    pub title: String,
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
    /// Normalized term -> role the term plays in this fragment
    pub term_roles: BTreeMap<String, OntologyCategory>,
}

impl SchemaFragment {
    pub fn new(model_type: ModelType, title: impl Into<String>) -> Self {
        Self {
            model_type,
            title: title.into(),
            node_types: Vec::new(),
            edge_types: Vec::new(),
            term_roles: BTreeMap::new(),
        }
    }

    pub fn with_node(mut self, name: impl Into<String>) -> Self {
        self.node_types.push(NodeType {
            name: name.into(),
            component: self.model_type.as_str().to_string(),
            description: String::new(),
            properties: Vec::new(),
        });
        self
    }

    pub fn with_edge(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edge_types.push(EdgeType {
            name: name.into(),
            component: self.model_type.as_str().to_string(),
            source: source.into(),
            target: target.into(),
            description: String::new(),
        });
        self
    }

    pub fn with_role(mut self, term: &str, role: OntologyCategory) -> Self {
        self.term_roles.insert(normalize_term(term), role);
        self
    }
}

/// A named sub-structure of a composed schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaComponent {
    pub name: String,
    pub model_type: ModelType,
}

/// One or more fragments merged into a multi-component schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedSchema {
    pub title: String,
    pub components: Vec<SchemaComponent>,
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
    /// Every role any fragment gave a term; more than one means cross-model
    pub term_roles: BTreeMap<String, BTreeSet<OntologyCategory>>,
}

impl ComposedSchema {
    /// An empty schema with no components.
    pub fn empty(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            components: Vec::new(),
            node_types: Vec::new(),
            edge_types: Vec::new(),
            term_roles: BTreeMap::new(),
        }
    }

    /// A single-component schema.
    pub fn from_fragment(fragment: SchemaFragment) -> Self {
        let mut schema = Self::empty(fragment.title.clone());
        schema.absorb(fragment);
        schema
    }

    /// Merge a fragment in as (part of) the component of its model type.
    ///
    /// Returns the terms that became cross-model because of this fragment.
    pub fn absorb(&mut self, fragment: SchemaFragment) -> Vec<String> {
        let component = fragment.model_type.as_str().to_string();
        if !self.components.iter().any(|c| c.model_type == fragment.model_type) {
            self.components.push(SchemaComponent {
                name: component.clone(),
                model_type: fragment.model_type,
            });
        }

        for mut node in fragment.node_types {
            node.component = component.clone();
            match self
                .node_types
                .iter_mut()
                .find(|n| n.component == node.component && n.name == node.name)
            {
                Some(existing) => {
                    for property in node.properties {
                        if !existing.properties.contains(&property) {
                            existing.properties.push(property);
                        }
                    }
                }
                None => self.node_types.push(node),
            }
        }

        for mut edge in fragment.edge_types {
            edge.component = component.clone();
            let duplicate = self.edge_types.iter().any(|e| {
                e.component == edge.component
                    && e.name == edge.name
                    && e.source == edge.source
                    && e.target == edge.target
            });
            if !duplicate {
                self.edge_types.push(edge);
            }
        }

        let mut newly_cross = Vec::new();
        for (term, role) in fragment.term_roles {
            let roles = self.term_roles.entry(term.clone()).or_default();
            let was_cross = roles.len() > 1;
            roles.insert(role);
            if !was_cross && roles.len() > 1 {
                newly_cross.push(term);
            }
        }
        newly_cross
    }

    /// Normalized terms the schema mentions: role entries, type names and
    /// node properties.
    pub fn covered_terms(&self) -> BTreeSet<String> {
        let mut covered: BTreeSet<String> = self.term_roles.keys().cloned().collect();
        for node in &self.node_types {
            covered.insert(normalize_term(&node.name));
            covered.extend(node.properties.iter().map(|p| normalize_term(p)));
        }
        covered.extend(self.edge_types.iter().map(|e| normalize_term(&e.name)));
        covered
    }

    /// Normalized terms of `vocabulary` the schema does not mention.
    pub fn missing_terms(&self, vocabulary: &Vocabulary) -> Vec<String> {
        let covered = self.covered_terms();
        vocabulary
            .normalized_terms()
            .filter(|t| !covered.contains(*t))
            .map(str::to_string)
            .collect()
    }

    /// Terms given different roles by different fragments.
    pub fn cross_model_terms(&self) -> Vec<String> {
        self.term_roles
            .iter()
            .filter(|(_, roles)| roles.len() > 1)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

/// Structural model of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaModel {
    Single(ModelType),
    Hybrid(Vec<ModelType>),
}

/// A blueprint entry: the extracted term and how the schema classifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub term: VocabularyTerm,
    pub assignment: OntologyAssignment,
    /// Roles the schema fragments gave this term
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_roles: Vec<OntologyCategory>,
    #[serde(default)]
    pub cross_model: bool,
}

/// The final, validated schema for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaBlueprint {
    pub title: String,
    pub segment_id: String,
    pub model_type: SchemaModel,
    pub components: Vec<SchemaComponent>,
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
    /// Keyed by normalized term
    pub definitions: BTreeMap<String, Definition>,
}

impl SchemaBlueprint {
    /// Normalized terms of `vocabulary` absent from `definitions`.
    pub fn missing_from(&self, vocabulary: &Vocabulary) -> Vec<String> {
        vocabulary
            .normalized_terms()
            .filter(|t| !self.definitions.contains_key(*t))
            .map(str::to_string)
            .collect()
    }

    /// True when every vocabulary term has a definition.
    pub fn verify_completeness(&self, vocabulary: &Vocabulary) -> bool {
        self.missing_from(vocabulary).is_empty()
    }

    pub fn cross_model_terms(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .filter(|(_, d)| d.cross_model)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(PipelineError::from)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(PipelineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_flags_conflicting_roles() {
        let graph = SchemaFragment::new(ModelType::PropertyGraph, "Stakeholders")
            .with_node("Stakeholder")
            .with_role("trust", OntologyCategory::Property);
        let seq = SchemaFragment::new(ModelType::Sequence, "Stages")
            .with_node("Stage")
            .with_role("Trust", OntologyCategory::Entity);

        let mut schema = ComposedSchema::from_fragment(graph);
        let cross = schema.absorb(seq);

        assert_eq!(cross, vec!["trust".to_string()]);
        assert_eq!(schema.components.len(), 2);
        let roles = &schema.term_roles["trust"];
        assert!(roles.contains(&OntologyCategory::Property));
        assert!(roles.contains(&OntologyCategory::Entity));
    }

    #[test]
    fn test_covered_terms_include_names_and_properties() {
        let mut fragment = SchemaFragment::new(ModelType::PropertyGraph, "G").with_node("Actor");
        fragment.node_types[0].properties.push("Social Status".into());
        let fragment = fragment.with_edge("Trusts", "Actor", "Actor");
        let schema = ComposedSchema::from_fragment(fragment);

        let covered = schema.covered_terms();
        assert!(covered.contains("actor"));
        assert!(covered.contains("social status"));
        assert!(covered.contains("trusts"));
    }
}
