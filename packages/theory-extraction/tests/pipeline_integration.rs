//! Integration tests for full pipeline runs.
//!
//! These drive the orchestrator end to end with a scripted completion client:
//! 1. Segment the document
//! 2. Extract vocabulary and run the detector ensemble
//! 3. Route, classify and generate
//! 4. Compose, repair and store blueprints

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use theory_extraction::{
    pipeline::{ONTOLOGICAL_CLASSIFICATION, SCHEMA_GENERATION, SEGMENTATION, VOCABULARY_EXTRACTION},
    ArtifactKey, ArtifactKind, ArtifactStore, AuditEvent, CallError, Document, ManualReviewReason,
    MemoryStore, ModelType, OntologyCategory, PipelineConfig, PipelineOrchestrator, RetryPolicy,
    RoutingMode, SchemaModel, ScriptedClient, SegmentStatus, Vocabulary,
};

const PAPER: &str = "Actors extend trust to one another. Reputation accumulates with each kept promise.";

fn config() -> PipelineConfig {
    PipelineConfig::default().with_retry(RetryPolicy::immediate(2))
}

/// Helper to script every call of a run.
///
/// Detectors not listed answer 0.1. Generation covers actor and trust but not
/// reputation unless `covers_reputation` is set.
fn scripted(detector_scores: &[(ModelType, f64)], covers_reputation: bool) -> ScriptedClient {
    let mut definitions = vec![json!({"term": "Trust", "role": "Relationship"})];
    if covers_reputation {
        definitions.push(json!({"term": "Reputation", "role": "Property"}));
    }

    let mut client = ScriptedClient::new()
        .with_json(SEGMENTATION, json!({"theory_count": 0, "theories": []}))
        .with_json(
            VOCABULARY_EXTRACTION,
            json!({"terms": [
                {"term": "Actor", "definition": "a participant in an exchange", "category": "actor"},
                {"term": "Trust", "definition": "reliance of an actor on another actor"},
                {"term": "Reputation", "definition": "standing an actor earns by keeping promises"}
            ]}),
        )
        .with_json(
            ONTOLOGICAL_CLASSIFICATION,
            json!({"assignments": [
                {"term": "Actor", "primary_type": "Entity"},
                {"term": "Trust", "primary_type": "Relationship", "domain_type": "Actor", "range_type": "Actor"},
                {"term": "Reputation", "primary_type": "Property"}
            ]}),
        )
        .with_json(
            SCHEMA_GENERATION,
            json!({
                "title": "Trust network",
                "node_types": [{"name": "Actor"}],
                "edge_types": [{"name": "Trust", "source": "Actor", "target": "Actor"}],
                "definitions": definitions
            }),
        );

    for model_type in ModelType::ALL {
        let confidence = detector_scores
            .iter()
            .find(|(t, _)| *t == model_type)
            .map_or(0.1, |(_, c)| *c);
        client = client.with_json(
            model_type.detector_template_id(),
            json!({"confidence": confidence, "evidence": []}),
        );
    }
    client
}

async fn stored_vocabulary(store: &MemoryStore, document_id: &str, segment_id: &str) -> Vocabulary {
    let stored = store
        .latest_artifact(&ArtifactKey::segment(document_id, segment_id, ArtifactKind::Vocabulary))
        .await
        .unwrap()
        .expect("vocabulary artifact");
    serde_json::from_value(stored.value).unwrap()
}

#[tokio::test]
async fn test_rerun_with_warm_cache_is_idempotent() {
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], true);
    let orchestrator = PipelineOrchestrator::with_config(client.clone(), MemoryStore::new(), config());
    let document = Document::new("axelrod", PAPER);

    let first = orchestrator.run(&document).await;
    let calls_after_first = client.calls().len();
    let second = orchestrator.run(&document).await;

    assert_eq!(client.calls().len(), calls_after_first, "warm cache must answer every call");
    assert_ne!(first.run_id, second.run_id);

    let first_blueprint = first.segments[0].blueprint.as_ref().unwrap();
    let second_blueprint = second.segments[0].blueprint.as_ref().unwrap();
    assert_eq!(
        first_blueprint.to_json_pretty().unwrap(),
        second_blueprint.to_json_pretty().unwrap()
    );
    assert_eq!(first.segments[0].revision, Some(1));
    assert_eq!(second.segments[0].revision, Some(1));

    let history = orchestrator
        .store()
        .artifact_history(&ArtifactKey::segment("axelrod", "axelrod#0", ArtifactKind::Blueprint))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_segmentation_failure_degrades_to_whole_document() {
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], true)
        .with_failure(SEGMENTATION, CallError::Service("overloaded".into()));
    let orchestrator = PipelineOrchestrator::with_config(client, MemoryStore::new(), config());

    let report = orchestrator.run(&Document::new("axelrod", PAPER)).await;

    assert!(report.segmentation_degraded);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.segments[0].segment_id, "axelrod#0");
    assert_eq!(report.segments[0].status, SegmentStatus::Completed);
    assert!(orchestrator
        .audit()
        .entries()
        .iter()
        .any(|e| matches!(e.event, AuditEvent::SegmentationDegraded { .. })));
}

#[tokio::test]
async fn test_hybrid_conflicting_roles_are_preserved() {
    let client = ScriptedClient::new()
        .with_json(SEGMENTATION, json!({"theory_count": 0, "theories": []}))
        .with_json(
            VOCABULARY_EXTRACTION,
            json!({"terms": [
                {"term": "Stakeholder", "definition": "a party affected by the decision"},
                {"term": "Consultation", "definition": "stakeholders are asked for their views"},
                {"term": "Engagement", "definition": "the overall participation process"}
            ]}),
        )
        .with_json(
            ONTOLOGICAL_CLASSIFICATION,
            json!({"assignments": [
                {"term": "Stakeholder", "primary_type": "Entity"},
                {"term": "Consultation", "primary_type": "Action"},
                {"term": "Engagement", "primary_type": "Action"}
            ]}),
        )
        .with_json_when(
            SCHEMA_GENERATION,
            "Generate a property_graph schema",
            json!({
                "title": "Stakeholder network",
                "node_types": [{"name": "Stakeholder"}],
                "edge_types": [{"name": "consults", "source": "Stakeholder", "target": "Stakeholder"}],
                "definitions": [{"term": "Consultation", "role": "Relationship"}]
            }),
        )
        .with_json_when(
            SCHEMA_GENERATION,
            "Generate a sequence schema",
            json!({
                "title": "Engagement stages",
                "node_types": [{"name": "Stage"}],
                "definitions": [
                    {"term": "Consultation", "role": "Action"},
                    {"term": "Engagement", "role": "Action"}
                ]
            }),
        );
    let client = ModelType::ALL.into_iter().fold(client, |client, model_type| {
        let confidence = match model_type {
            ModelType::PropertyGraph => 0.85,
            ModelType::Sequence => 0.68,
            _ => 0.1,
        };
        client.with_json(model_type.detector_template_id(), json!({"confidence": confidence}))
    });
    let orchestrator = PipelineOrchestrator::with_config(client, MemoryStore::new(), config());

    let report = orchestrator
        .run(&Document::new("arnstein", "Stakeholders move through stages of engagement."))
        .await;

    let segment = &report.segments[0];
    assert_eq!(segment.status, SegmentStatus::Completed);
    assert_eq!(segment.decision.as_ref().unwrap().mode, RoutingMode::Hybrid);

    let blueprint = segment.blueprint.as_ref().unwrap();
    assert_eq!(
        blueprint.model_type,
        SchemaModel::Hybrid(vec![ModelType::PropertyGraph, ModelType::Sequence])
    );
    assert_eq!(blueprint.components.len(), 2);
    let consultation = &blueprint.definitions["consultation"];
    assert!(consultation.cross_model);
    assert!(consultation.schema_roles.contains(&OntologyCategory::Relationship));
    assert!(consultation.schema_roles.contains(&OntologyCategory::Action));
    assert_eq!(blueprint.cross_model_terms(), vec!["consultation"]);

    let conflicts: Vec<_> = orchestrator
        .audit()
        .entries()
        .into_iter()
        .filter_map(|e| match e.event {
            AuditEvent::CrossModelConflict { term, .. } => Some(term),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts, vec!["consultation".to_string()]);

    let vocabulary = stored_vocabulary(orchestrator.store(), "arnstein", "arnstein#0").await;
    assert!(blueprint.verify_completeness(&vocabulary));
}

#[tokio::test]
async fn test_every_completed_blueprint_covers_its_vocabulary() {
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], false)
        // The repair pass names the omitted term, so the scripted answer covers it.
        .with_json_when(
            SCHEMA_GENERATION,
            "previous schema omitted",
            json!({
                "title": "Trust network",
                "node_types": [{"name": "Actor", "properties": ["Reputation"]}]
            }),
        );
    let orchestrator = PipelineOrchestrator::with_config(client.clone(), MemoryStore::new(), config());

    let report = orchestrator.run(&Document::new("axelrod", PAPER)).await;

    let segment = &report.segments[0];
    assert_eq!(segment.status, SegmentStatus::Completed);
    assert_eq!(client.call_count(SCHEMA_GENERATION), 2);

    let blueprint = segment.blueprint.as_ref().unwrap();
    let vocabulary = stored_vocabulary(orchestrator.store(), "axelrod", "axelrod#0").await;
    assert!(blueprint.verify_completeness(&vocabulary));
    assert_eq!(blueprint.definitions.len(), vocabulary.len());

    let repairs = orchestrator
        .audit()
        .entries()
        .into_iter()
        .filter(|e| matches!(e.event, AuditEvent::RepairAttempt { .. }))
        .count();
    assert_eq!(repairs, 1);
}

#[tokio::test]
async fn test_repair_loop_terminates_with_schema_incomplete() {
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], false);
    let orchestrator = PipelineOrchestrator::with_config(
        client,
        MemoryStore::new(),
        config().with_max_repair_attempts(3),
    );

    let report = orchestrator.run(&Document::new("axelrod", PAPER)).await;
    // One generation pass plus one call per repair pass
    assert_eq!(orchestrator.client().call_count(SCHEMA_GENERATION), 4);

    let segment = &report.segments[0];
    assert_eq!(
        segment.status,
        SegmentStatus::ManualReview {
            reason: ManualReviewReason::SchemaIncomplete {
                missing_terms: vec!["reputation".to_string()]
            }
        }
    );
    assert!(segment.blueprint.is_none());

    let events: Vec<_> = orchestrator
        .audit()
        .entries_for_segment("axelrod#0")
        .into_iter()
        .map(|e| e.event)
        .collect();
    let repairs = events
        .iter()
        .filter(|e| matches!(e, AuditEvent::RepairAttempt { .. }))
        .count();
    assert_eq!(repairs, 3);
    assert!(events.iter().any(|e| matches!(
        e,
        AuditEvent::TermsDropped { terms, reason, .. }
            if terms == &vec!["reputation".to_string()]
                && reason == "schema incomplete after 3 repair attempt(s)"
    )));

    let stored = orchestrator
        .store()
        .latest_artifact(&ArtifactKey::segment("axelrod", "axelrod#0", ArtifactKind::Blueprint))
        .await
        .unwrap();
    assert!(stored.is_none());

    let calls_after_first = orchestrator.client().calls().len();
    orchestrator.run(&Document::new("axelrod", PAPER)).await;
    assert_eq!(orchestrator.client().calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_segment_failure_does_not_affect_siblings() {
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], true)
        .with_json(
            SEGMENTATION,
            json!({"theory_count": 2, "theories": [
                {"title": "Cooperation", "start": 0, "end": 8},
                {"title": "Exchange", "start": 9, "end": 17}
            ]}),
        )
        .with_result_when(
            SCHEMA_GENERATION,
            "Theory B",
            Err(CallError::Service("content filtered".into())),
        );
    let orchestrator = PipelineOrchestrator::with_config(client, MemoryStore::new(), config());

    let report = orchestrator.run(&Document::new("paper", "Theory A Theory B")).await;

    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].status, SegmentStatus::Completed);
    assert_eq!(
        report.segments[0].blueprint.as_ref().unwrap().title,
        "Cooperation"
    );
    assert!(matches!(report.segments[1].status, SegmentStatus::Failed { .. }));
    assert_eq!(report.segments[1].vocabulary_size, 3);
    assert!(report.segments[1].decision.is_some());

    let dropped = orchestrator.audit().dropped_terms("paper#1");
    assert_eq!(dropped, vec!["actor", "trust", "reputation"]);
    assert!(orchestrator.audit().dropped_terms("paper#0").is_empty());
}

#[tokio::test]
async fn test_deadline_routes_unfinished_segment_to_review() {
    // Each call takes 400ms: segmentation ends at ~0.4s, vocabulary and
    // detectors at ~0.8s, classification would end at ~1.2s.
    let client = scripted(&[(ModelType::PropertyGraph, 0.92)], true)
        .with_latency(Duration::from_millis(400));
    let orchestrator = PipelineOrchestrator::with_config(
        client.clone(),
        MemoryStore::new(),
        config().with_document_deadline(Duration::from_secs(1)),
    );

    let started = Instant::now();
    let report = orchestrator.run(&Document::new("axelrod", PAPER)).await;

    assert!(started.elapsed() < Duration::from_millis(1_150));
    assert!(!report.segmentation_degraded);
    let segment = &report.segments[0];
    assert_eq!(
        segment.status,
        SegmentStatus::ManualReview {
            reason: ManualReviewReason::Timeout
        }
    );
    assert_eq!(segment.vocabulary_size, 3);
    assert_eq!(segment.decision.as_ref().unwrap().mode, RoutingMode::Single);
    assert!(segment.blueprint.is_none());
    assert_eq!(client.call_count(SCHEMA_GENERATION), 0);

    let events: Vec<Value> = orchestrator
        .audit()
        .entries_for_segment("axelrod#0")
        .into_iter()
        .map(|e| serde_json::to_value(e.event).unwrap())
        .collect();
    assert!(events.iter().any(|e| e["event"] == "segment_timed_out"));
    assert!(events
        .iter()
        .any(|e| e["event"] == "terms_dropped" && e["reason"] == "timeout"));
}
