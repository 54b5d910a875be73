//! Composition of several model-type fragments into one hybrid schema.
//!
//! Each fragment becomes its own named component; no model type absorbs
//! another's semantics. A term given different roles by different fragments
//! keeps every role, is tagged cross-model and is recorded in the audit log.

use tracing::{info, instrument, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::types::document::TheorySegment;
use crate::types::model_type::ModelType;
use crate::types::schema::{ComposedSchema, SchemaFragment};

pub struct HybridComposer<'a> {
    audit: &'a AuditLog,
}

impl<'a> HybridComposer<'a> {
    pub fn new(audit: &'a AuditLog) -> Self {
        Self { audit }
    }

    /// Merge fragments in the order of `chosen_model_types`.
    ///
    /// Fragments of model types that were not chosen are ignored.
    #[instrument(skip_all, fields(segment_id = %segment.segment_id))]
    pub fn compose(
        &self,
        segment: &TheorySegment,
        chosen_model_types: &[ModelType],
        fragments: Vec<SchemaFragment>,
    ) -> ComposedSchema {
        let mut by_type: Vec<Option<SchemaFragment>> = vec![None; chosen_model_types.len()];
        for fragment in fragments {
            match chosen_model_types
                .iter()
                .position(|t| *t == fragment.model_type)
            {
                Some(i) if by_type[i].is_none() => by_type[i] = Some(fragment),
                Some(_) => warn!(model_type = %fragment.model_type, "Duplicate fragment ignored"),
                None => warn!(model_type = %fragment.model_type, "Fragment for unchosen model type ignored"),
            }
        }

        let title = segment.title.clone().unwrap_or_else(|| {
            by_type
                .iter()
                .flatten()
                .map(|f| f.title.as_str())
                .collect::<Vec<_>>()
                .join(" + ")
        });
        let mut schema = ComposedSchema::empty(title);

        for (model_type, fragment) in chosen_model_types.iter().zip(by_type) {
            let Some(fragment) = fragment else {
                warn!(model_type = %model_type, "No fragment for chosen model type");
                continue;
            };
            for term in schema.absorb(fragment) {
                let roles = schema.term_roles[&term].iter().copied().collect();
                self.audit.record(AuditEvent::CrossModelConflict {
                    segment_id: segment.segment_id.clone(),
                    term,
                    roles,
                });
            }
        }

        info!(
            components = schema.components.len(),
            cross_model = schema.cross_model_terms().len(),
            "Composed hybrid schema"
        );
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::Document;
    use crate::types::ontology::OntologyCategory;

    fn segment() -> TheorySegment {
        TheorySegment::whole(&Document::new("doc", "Stages of stakeholder engagement."))
    }

    #[test]
    fn test_conflicting_roles_both_survive() {
        let audit = AuditLog::new();
        let sequence = SchemaFragment::new(ModelType::Sequence, "Engagement stages")
            .with_node("Stage")
            .with_role("consultation", OntologyCategory::Action);
        let graph = SchemaFragment::new(ModelType::PropertyGraph, "Stakeholders")
            .with_node("Stakeholder")
            .with_edge("consults", "Stakeholder", "Stakeholder")
            .with_role("consultation", OntologyCategory::Relationship);

        let schema = HybridComposer::new(&audit).compose(
            &segment(),
            &[ModelType::PropertyGraph, ModelType::Sequence],
            vec![sequence, graph],
        );

        assert_eq!(schema.title, "Stakeholders + Engagement stages");
        let components: Vec<_> = schema.components.iter().map(|c| c.model_type).collect();
        assert_eq!(components, vec![ModelType::PropertyGraph, ModelType::Sequence]);
        let roles = &schema.term_roles["consultation"];
        assert!(roles.contains(&OntologyCategory::Action));
        assert!(roles.contains(&OntologyCategory::Relationship));
        assert_eq!(schema.cross_model_terms(), vec!["consultation".to_string()]);

        let entries = audit.entries_for_segment("doc#0");
        assert_eq!(entries.len(), 1);
        match &entries[0].event {
            AuditEvent::CrossModelConflict { term, roles, .. } => {
                assert_eq!(term, "consultation");
                assert_eq!(roles.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unchosen_and_missing_fragments() {
        let audit = AuditLog::new();
        let logical = SchemaFragment::new(ModelType::Logical, "Rules").with_node("Rule");

        let schema = HybridComposer::new(&audit).compose(
            &segment(),
            &[ModelType::Sequence, ModelType::Statistical],
            vec![logical],
        );

        assert!(schema.components.is_empty());
        assert!(audit.is_empty());
    }
}
