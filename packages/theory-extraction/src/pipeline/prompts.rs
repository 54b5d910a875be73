//! Prompt templates for each pipeline phase.
//!
//! Templates are opaque strings with `{variable}` placeholders. Applications
//! can replace any of them; the pipeline only relies on the template ids and
//! on the JSON shape described by the `response_schema` variable.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::types::model_type::ModelType;

/// Theory count and boundary detection.
pub const SEGMENTATION: &str = "phase0_theory_segmentation";

/// Exhaustive vocabulary extraction.
pub const VOCABULARY_EXTRACTION: &str = "phase1_vocabulary_extraction";

/// Ontological classification of vocabulary terms.
pub const ONTOLOGICAL_CLASSIFICATION: &str = "phase2_ontological_classification";

/// Schema generation (and repair).
pub const SCHEMA_GENERATION: &str = "phase3_schema_generation";

/// Variables substituted into a template.
pub type PromptVariables = BTreeMap<String, String>;

/// Prompt for counting theories and finding their boundaries.
pub const SEGMENTATION_PROMPT: &str = r#"You are reading an academic paper that may describe one or several social-science theories.

Count the distinct theories and give the character span of the passage that expresses each one.
Spans are half-open [start, end) character offsets into the text below and must not overlap.
If the paper describes a single theory, return one span covering it.

Document ({char_count} characters):
{document_text}

Respond with JSON matching this schema:
{response_schema}"#;

/// Prompt for exhaustive vocabulary extraction.
pub const VOCABULARY_PROMPT: &str = r#"Extract EVERY technical term, construct, mechanism, actor, process and measure used by the theory below.

Be exhaustive: do not cap the number of terms and do not merge distinct concepts.
For each term give its definition as used in this text, a short context snippet quoting the text,
a page reference when one is visible, and a category hint (construct, mechanism, actor, process, measure, condition, outcome).

Theory text:
{segment_text}

Respond with JSON matching this schema:
{response_schema}"#;

/// Prompt shared by the specialized model-type detectors.
pub const DETECTOR_PROMPT: &str = r#"Judge how well the theory below fits the {model_type} structural pattern.

Pattern: {pattern}

Score your confidence from 0.0 (does not fit) to 1.0 (clearly the best representation) and quote the passages that support the score.

Theory text:
{segment_text}

Respond with JSON matching this schema:
{response_schema}"#;

/// Prompt for ontological classification.
pub const CLASSIFICATION_PROMPT: &str = r#"Classify each vocabulary term of the theory below into exactly one primary category:
Entity, Relationship, Property, Action, Measure, Modifier, TruthValue, Operator.

Give a subtype where one is evident. For Relationship and Action terms, give the domain and range
as the MOST SPECIFIC entity term from this vocabulary that fits; use "Entity" only when none fits.

Theory text:
{segment_text}

Vocabulary:
{vocabulary}

Respond with JSON matching this schema:
{response_schema}"#;

/// Prompt for schema generation.
pub const SCHEMA_PROMPT: &str = r#"Generate a {model_type} schema for the theory below.

Every vocabulary term MUST appear in the schema: as a node type, an edge type, a node property,
or at minimum in the definitions list with the role it plays. Do not drop any term.

Theory text:
{segment_text}

Vocabulary with ontological classification:
{vocabulary}

{missing_terms_section}

Respond with JSON matching this schema:
{response_schema}"#;

/// One-line description of each structural pattern.
pub fn pattern_description(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::TableMatrix => {
            "a typology or matrix that cross-classifies cases along two or more dimensions"
        }
        ModelType::PropertyGraph => {
            "typed actors or concepts connected by typed, directed relationships with attributes"
        }
        ModelType::Sequence => "ordered stages, phases or steps of a process over time",
        ModelType::Statistical => {
            "variables linked by measurable, directional effects, moderators and mediators"
        }
        ModelType::Logical => "propositions, conditions and inference rules (if/then, necessity, sufficiency)",
        ModelType::Hypergraph => "relations that bind three or more participants at once",
    }
}

/// Registry of prompt templates keyed by template id.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: BTreeMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(SEGMENTATION.to_string(), SEGMENTATION_PROMPT.to_string());
        templates.insert(VOCABULARY_EXTRACTION.to_string(), VOCABULARY_PROMPT.to_string());
        templates.insert(
            ONTOLOGICAL_CLASSIFICATION.to_string(),
            CLASSIFICATION_PROMPT.to_string(),
        );
        templates.insert(SCHEMA_GENERATION.to_string(), SCHEMA_PROMPT.to_string());
        for model_type in ModelType::ALL {
            let text = DETECTOR_PROMPT
                .replace("{model_type}", model_type.as_str())
                .replace("{pattern}", pattern_description(model_type));
            templates.insert(model_type.detector_template_id(), text);
        }
        Self { templates }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("static regex"))
}

impl PromptTemplates {
    /// The built-in templates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or add a template.
    pub fn with_template(mut self, template_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(template_id.into(), text.into());
        self
    }

    pub fn get(&self, template_id: &str) -> Option<&str> {
        self.templates.get(template_id).map(|t| t.as_str())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|k| k.as_str())
    }

    /// Render a template. Every placeholder must have a variable.
    pub fn render(&self, template_id: &str, variables: &PromptVariables) -> Result<String> {
        let template = self
            .get(template_id)
            .ok_or_else(|| PipelineError::Template(format!("unknown template: {template_id}")))?;

        let re = placeholder_regex();
        if let Some(missing) = re
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .find(|name| !variables.contains_key(name))
        {
            return Err(PipelineError::Template(format!(
                "{template_id}: no value for {{{missing}}}"
            )));
        }

        Ok(re
            .replace_all(template, |caps: &regex::Captures| {
                variables[&caps[1]].clone()
            })
            .into_owned())
    }

    /// Hash of a template's text, so cached output is invalidated when the
    /// template changes.
    pub fn template_hash(&self, template_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(template_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.get(template_id).unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Build a variables map from pairs.
pub fn variables<const N: usize>(pairs: [(&str, String); N]) -> PromptVariables {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
