//! Blueprint assembly and the vocabulary-completeness invariant.
//!
//! A blueprint's `definitions` only holds terms the schema actually mentions.
//! When terms are missing, schema generation is re-run with the missing list
//! appended, at most `max_repair_attempts` times; after that the segment fails
//! with [`SchemaIncompleteError`]. A blueprint is never returned incomplete.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use super::generate::{GenerationRequest, SchemaGenerator};
use crate::audit::{AuditEvent, AuditLog};
use crate::error::{PipelineError, Result, SchemaIncompleteError};
use crate::pipeline::ontology::heuristic_category;
use crate::types::document::TheorySegment;
use crate::types::ontology::{AssignmentSource, OntologyAssignment, GENERIC_ENTITY};
use crate::types::schema::{ComposedSchema, Definition, SchemaBlueprint, SchemaModel};
use crate::types::vocabulary::{Vocabulary, VocabularyTerm};

/// Assignment for a term the classifier did not cover.
fn fallback_assignment(term: &VocabularyTerm) -> OntologyAssignment {
    let mut assignment = OntologyAssignment::new(term.normalized.clone(), heuristic_category(term));
    assignment.source = AssignmentSource::Heuristic;
    if assignment.primary_type.is_relational() {
        assignment.domain_type = Some(GENERIC_ENTITY.to_string());
        assignment.range_type = Some(GENERIC_ENTITY.to_string());
    }
    assignment
}

pub struct SchemaAssembler<'a, G: SchemaGenerator + ?Sized> {
    generator: &'a G,
    audit: &'a AuditLog,
    max_repair_attempts: u32,
}

impl<'a, G: SchemaGenerator + ?Sized> SchemaAssembler<'a, G> {
    pub fn new(generator: &'a G, audit: &'a AuditLog, max_repair_attempts: u32) -> Self {
        Self {
            generator,
            audit,
            max_repair_attempts,
        }
    }

    /// Assemble a blueprint from a composed schema, repairing as needed.
    ///
    /// Repairs regenerate the first model type of `model` and merge the
    /// result into its component.
    #[instrument(skip_all, fields(segment_id = %segment.segment_id, terms = vocabulary.len()))]
    pub async fn assemble(
        &self,
        segment: &TheorySegment,
        vocabulary: &Vocabulary,
        assignments: &BTreeMap<String, OntologyAssignment>,
        mut schema: ComposedSchema,
        model: SchemaModel,
    ) -> Result<SchemaBlueprint> {
        let repair_type = match &model {
            SchemaModel::Single(t) => Some(*t),
            SchemaModel::Hybrid(types) => types.first().copied(),
        };

        let mut missing = schema.missing_terms(vocabulary);
        let mut attempt = 0;
        while !missing.is_empty() && attempt < self.max_repair_attempts {
            let Some(model_type) = repair_type else {
                break;
            };
            attempt += 1;

            let result = self
                .generator
                .generate(GenerationRequest {
                    segment,
                    model_type,
                    vocabulary,
                    assignments,
                    missing_terms: &missing,
                    repair_attempt: attempt,
                })
                .await;

            let missing_before = std::mem::take(&mut missing);
            match result {
                Ok(fragment) => {
                    schema.absorb(fragment);
                    missing = schema.missing_terms(vocabulary);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Repair generation failed");
                    missing = missing_before.clone();
                }
            }

            info!(
                attempt,
                before = missing_before.len(),
                after = missing.len(),
                "Repair pass"
            );
            self.audit.record(AuditEvent::RepairAttempt {
                segment_id: segment.segment_id.clone(),
                attempt,
                missing_before,
                missing_after: missing.clone(),
            });
        }

        if !missing.is_empty() {
            return Err(PipelineError::SchemaIncomplete(SchemaIncompleteError {
                segment_id: segment.segment_id.clone(),
                missing_terms: missing,
                attempts: attempt,
            }));
        }

        let blueprint = build_blueprint(segment, vocabulary, assignments, schema, model);
        debug_assert!(blueprint.verify_completeness(vocabulary));
        Ok(blueprint)
    }
}

fn build_blueprint(
    segment: &TheorySegment,
    vocabulary: &Vocabulary,
    assignments: &BTreeMap<String, OntologyAssignment>,
    schema: ComposedSchema,
    model: SchemaModel,
) -> SchemaBlueprint {
    let covered = schema.covered_terms();
    let definitions = vocabulary
        .iter()
        .filter(|term| covered.contains(&term.normalized))
        .map(|term| {
            let assignment = assignments
                .get(&term.normalized)
                .cloned()
                .unwrap_or_else(|| fallback_assignment(term));
            let schema_roles: Vec<_> = schema
                .term_roles
                .get(&term.normalized)
                .map(|roles| roles.iter().copied().collect())
                .unwrap_or_default();
            let definition = Definition {
                term: term.clone(),
                assignment,
                cross_model: schema_roles.len() > 1,
                schema_roles,
            };
            (term.normalized.clone(), definition)
        })
        .collect();

    SchemaBlueprint {
        title: schema.title,
        segment_id: segment.segment_id.clone(),
        model_type: model,
        components: schema.components,
        node_types: schema.node_types,
        edge_types: schema.edge_types,
        definitions,
    }
}
