//! The PipelineOrchestrator - main entry point of the library.
//!
//! Runs every stage for a document: segmentation, then per segment
//! vocabulary extraction alongside the detector ensemble, routing, ontology
//! classification, fragment generation, composition and assembly.
//!
//! Segments are independent: one failing never affects another, and a run
//! always ends with a [`DocumentReport`]. A per-document deadline cancels
//! outstanding calls; segments cut short are routed to manual review with
//! reason `timeout` and keep whatever they had already produced.

use std::sync::{Mutex, MutexGuard};

use futures::{future::join_all, stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::assemble::SchemaAssembler;
use super::call::CallLayer;
use super::detect::DetectorEnsemble;
use super::generate::{GenerationRequest, LlmSchemaGenerator, SchemaGenerator};
use super::hybrid::HybridComposer;
use super::ontology::OntologyClassifier;
use super::prompts::PromptTemplates;
use super::routing::ConfidenceIntegrator;
use super::segment::TheorySegmenter;
use super::vocabulary::VocabularyExtractor;
use crate::audit::{AuditEvent, AuditLog};
use crate::error::{PipelineError, Result};
use crate::traits::completion::CompletionClient;
use crate::traits::store::{ArtifactKey, ArtifactKind, ArtifactStore, PipelineStore};
use crate::types::config::PipelineConfig;
use crate::types::document::{Document, Segmentation, TheorySegment};
use crate::types::model_type::ModelType;
use crate::types::report::{DocumentReport, SegmentReport, SegmentStatus};
use crate::types::routing::{ManualReviewReason, RoutingDecision, RoutingMode};
use crate::types::schema::{ComposedSchema, SchemaModel};
use crate::types::vocabulary::Vocabulary;

/// What a segment had produced so far; read back when it is cut short.
#[derive(Default)]
struct SegmentProgress {
    vocabulary: Option<Vocabulary>,
    decision: Option<RoutingDecision>,
}

fn lock_progress(mutex: &Mutex<SegmentProgress>) -> MutexGuard<'_, SegmentProgress> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sequences the pipeline stages over documents.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = PipelineOrchestrator::new(client, MemoryStore::new());
///
/// let report = orchestrator.run(&Document::new("putnam-1995", text)).await;
/// for segment in report.needs_review() {
///     println!("{}: {}", segment.segment_id, segment.status);
/// }
/// ```
pub struct PipelineOrchestrator<C: CompletionClient, S: PipelineStore> {
    client: C,
    store: S,
    templates: PromptTemplates,
    config: PipelineConfig,
    audit: AuditLog,
}

impl<C: CompletionClient, S: PipelineStore> PipelineOrchestrator<C, S> {
    /// Create an orchestrator with the default configuration and templates.
    pub fn new(client: C, store: S) -> Self {
        Self::with_config(client, store, PipelineConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(client: C, store: S, config: PipelineConfig) -> Self {
        Self {
            client,
            store,
            templates: PromptTemplates::default(),
            config,
            audit: AuditLog::new(),
        }
    }

    /// Replace the prompt templates.
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// The audit trail of every run so far.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn calls(&self) -> CallLayer<'_> {
        CallLayer {
            client: &self.client,
            cache: &self.store,
            templates: &self.templates,
            retry: self.config.retry,
            cache_ttl: self.config.cache_ttl(),
        }
    }

    /// Run the pipeline over a document under the configured deadline.
    pub async fn run(&self, document: &Document) -> DocumentReport {
        self.run_with_cancel(document, CancellationToken::new()).await
    }

    /// Run with an external cancellation token as well as the deadline.
    ///
    /// Cancelling the token has the same effect as the deadline expiring.
    #[instrument(skip(self, document, cancel), fields(document_id = %document.id, run_id = tracing::field::Empty))]
    pub async fn run_with_cancel(
        &self,
        document: &Document,
        cancel: CancellationToken,
    ) -> DocumentReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let deadline = tokio::time::Instant::now() + self.config.document_deadline();

        let segmenter = TheorySegmenter::new(self.calls());
        let segmentation = tokio::select! {
            segmentation = segmenter.segment(document) => segmentation,
            _ = tokio::time::sleep_until(deadline) => {
                warn!("Deadline expired during segmentation");
                cancel.cancel();
                Segmentation::degraded(document, "deadline expired during segmentation")
            }
            _ = cancel.cancelled() => {
                Segmentation::degraded(document, "cancelled during segmentation")
            }
        };

        if segmentation.segmentation_degraded {
            self.audit.record(AuditEvent::SegmentationDegraded {
                document_id: document.id.clone(),
                reason: segmentation.degraded_reason.clone().unwrap_or_default(),
            });
        }
        if let Err(e) = self
            .persist(
                ArtifactKey::document(&document.id, ArtifactKind::Segmentation),
                &segmentation,
            )
            .await
        {
            warn!(error = %e, "Failed to persist segmentation");
        }

        let work = stream::iter(
            segmentation
                .segments
                .iter()
                .map(|segment| self.run_segment(segment, &document.id, &cancel)),
        )
        .buffered(self.config.max_concurrent_segments.max(1))
        .collect::<Vec<SegmentReport>>();
        tokio::pin!(work);

        let finished = tokio::time::timeout_at(deadline, &mut work).await;
        let segments = match finished {
            Ok(segments) => segments,
            Err(_) => {
                warn!("Document deadline expired, cancelling outstanding calls");
                cancel.cancel();
                work.await
            }
        };

        let report = DocumentReport {
            run_id,
            document_id: document.id.clone(),
            segmentation_degraded: segmentation.segmentation_degraded,
            segments,
        };
        info!(
            segments = report.segments.len(),
            completed = report.completed().count(),
            manual_review = report.needs_review().count(),
            failed = report.failed().count(),
            "Pipeline run finished"
        );
        report
    }

    async fn run_segment(
        &self,
        segment: &TheorySegment,
        document_id: &str,
        cancel: &CancellationToken,
    ) -> SegmentReport {
        let progress = Mutex::new(SegmentProgress::default());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.process_segment(segment, document_id, &progress) => Some(result),
        };

        let progress = progress
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match outcome {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                warn!(segment_id = %segment.segment_id, error = %e, "Segment failed");
                self.record_dropped(segment, progress.vocabulary.as_ref(), format!("failed: {e}"));
                let mut report = SegmentReport::new(
                    segment.segment_id.clone(),
                    SegmentStatus::Failed {
                        error: e.to_string(),
                    },
                );
                report.vocabulary_size = progress.vocabulary.as_ref().map_or(0, Vocabulary::len);
                report.decision = progress.decision;
                report
            }
            None => {
                warn!(segment_id = %segment.segment_id, "Segment timed out");
                self.audit.record(AuditEvent::SegmentTimedOut {
                    segment_id: segment.segment_id.clone(),
                });
                self.record_dropped(segment, progress.vocabulary.as_ref(), "timeout".to_string());
                let mut report = SegmentReport::new(
                    segment.segment_id.clone(),
                    SegmentStatus::ManualReview {
                        reason: ManualReviewReason::Timeout,
                    },
                );
                report.vocabulary_size = progress.vocabulary.as_ref().map_or(0, Vocabulary::len);
                report.decision = progress.decision;
                report
            }
        }
    }

    #[instrument(skip(self, segment, progress), fields(segment_id = %segment.segment_id))]
    async fn process_segment(
        &self,
        segment: &TheorySegment,
        document_id: &str,
        progress: &Mutex<SegmentProgress>,
    ) -> Result<SegmentReport> {
        let calls = self.calls();
        let segment_id = segment.segment_id.as_str();
        let key = |kind| ArtifactKey::segment(document_id, segment_id, kind);

        // Vocabulary and detectors are independent; the ensemble joins all
        // detectors before routing.
        let extractor = VocabularyExtractor::new(calls);
        let ensemble = DetectorEnsemble::new(calls);
        let (vocabulary, detection) =
            tokio::join!(extractor.extract(segment), ensemble.detect_all(segment));

        for failure in &detection.failures {
            self.audit.record(AuditEvent::DetectorFailed {
                segment_id: segment_id.to_string(),
                detector: failure.detector.to_string(),
                error: failure.error.clone(),
            });
        }
        self.persist(key(ArtifactKind::DetectorScores), &detection.scores)
            .await?;

        let vocabulary = vocabulary?;
        self.persist(key(ArtifactKind::Vocabulary), &vocabulary).await?;
        lock_progress(progress).vocabulary = Some(vocabulary.clone());

        let integrator = ConfidenceIntegrator::new(
            self.config.routing,
            self.config.compatibility.clone(),
        );
        let decision = integrator.integrate(segment_id, &detection.scores);
        self.audit.record(AuditEvent::Routing {
            decision: decision.clone(),
        });
        self.persist(key(ArtifactKind::Routing), &decision).await?;
        lock_progress(progress).decision = Some(decision.clone());
        info!(mode = ?decision.mode, chosen = ?decision.chosen_model_types, "Routed segment");

        let mut report = SegmentReport::new(segment_id, SegmentStatus::Completed);
        report.vocabulary_size = vocabulary.len();
        report.decision = Some(decision.clone());

        if decision.mode == RoutingMode::ManualReview {
            let reason = decision
                .reason
                .clone()
                .unwrap_or(ManualReviewReason::NoScores);
            self.record_dropped(segment, Some(&vocabulary), format!("manual review: {reason}"));
            report.status = SegmentStatus::ManualReview { reason };
            return Ok(report);
        }

        let assignments = OntologyClassifier::new(calls)
            .classify_all(segment, &vocabulary)
            .await;
        self.persist(key(ArtifactKind::Ontology), &assignments).await?;

        let generator = LlmSchemaGenerator::new(calls);
        let results = join_all(decision.chosen_model_types.iter().map(|model_type| {
            generator.generate(GenerationRequest {
                segment,
                model_type: *model_type,
                vocabulary: &vocabulary,
                assignments: &assignments,
                missing_terms: &[],
                repair_attempt: 0,
            })
        }))
        .await;

        let mut fragments = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (model_type, result) in decision.chosen_model_types.iter().zip(results) {
            match result {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => {
                    warn!(model_type = %model_type, error = %e, "Fragment generation failed");
                    self.audit.record(AuditEvent::FragmentFailed {
                        segment_id: segment_id.to_string(),
                        model_type: model_type.to_string(),
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        // The blueprint describes the components that were actually built.
        let built: Vec<ModelType> = fragments.iter().map(|f| f.model_type).collect();
        let (model, schema) = match built.as_slice() {
            [] => {
                return Err(last_error.unwrap_or_else(|| {
                    PipelineError::Template("no model type to generate".to_string())
                }));
            }
            [only] => {
                let model = SchemaModel::Single(*only);
                let mut schema = ComposedSchema::from_fragment(fragments.remove(0));
                if let Some(title) = &segment.title {
                    schema.title = title.clone();
                }
                (model, schema)
            }
            _ => {
                let schema = HybridComposer::new(&self.audit).compose(segment, &built, fragments);
                (SchemaModel::Hybrid(built.clone()), schema)
            }
        };

        let assembled = SchemaAssembler::new(&generator, &self.audit, self.config.max_repair_attempts)
            .assemble(segment, &vocabulary, &assignments, schema, model)
            .await;

        match assembled {
            Ok(blueprint) => {
                let revision = self.persist(key(ArtifactKind::Blueprint), &blueprint).await?;
                info!(revision, definitions = blueprint.definitions.len(), "Blueprint stored");
                report.blueprint = Some(blueprint);
                report.revision = Some(revision);
                Ok(report)
            }
            Err(PipelineError::SchemaIncomplete(e)) => {
                self.audit.record(AuditEvent::TermsDropped {
                    segment_id: segment_id.to_string(),
                    terms: e.missing_terms.clone(),
                    reason: format!("schema incomplete after {} repair attempt(s)", e.attempts),
                });
                report.status = SegmentStatus::ManualReview {
                    reason: ManualReviewReason::SchemaIncomplete {
                        missing_terms: e.missing_terms,
                    },
                };
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    /// Record every term of a vocabulary that will not reach a schema.
    fn record_dropped(&self, segment: &TheorySegment, vocabulary: Option<&Vocabulary>, reason: String) {
        let Some(vocabulary) = vocabulary.filter(|v| !v.is_empty()) else {
            return;
        };
        self.audit.record(AuditEvent::TermsDropped {
            segment_id: segment.segment_id.clone(),
            terms: vocabulary.normalized_terms().map(str::to_string).collect(),
            reason,
        });
    }

    async fn persist<T: Serialize>(&self, key: ArtifactKey, value: &T) -> Result<u32> {
        let value = serde_json::to_value(value)?;
        self.store.put_artifact(&key, value).await
    }
}
