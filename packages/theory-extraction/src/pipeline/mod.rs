//! Theory extraction pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Theory segmentation (with whole-document fallback)
//! - Vocabulary extraction and model-type detection, in parallel
//! - Confidence integration into a routing decision
//! - Ontological classification
//! - Schema generation, hybrid composition and completeness-checked assembly

pub mod assemble;
pub mod call;
pub mod detect;
pub mod generate;
pub mod hybrid;
pub mod ontology;
pub mod orchestrator;
pub mod prompts;
pub mod routing;
pub mod segment;
pub mod vocabulary;

pub use assemble::SchemaAssembler;
pub use call::{input_hash, parse_completion, response_schema, CallLayer, Validate};
pub use detect::{DetectionResponse, DetectorEnsemble, DetectorFailure, EnsembleOutcome, ModelTypeDetector};
pub use generate::{GenerationRequest, LlmSchemaGenerator, SchemaGenerator, SchemaResponse};
pub use hybrid::HybridComposer;
pub use ontology::{heuristic_category, ClassificationContext, OntologyClassifier};
pub use orchestrator::PipelineOrchestrator;
pub use prompts::{
    pattern_description, PromptTemplates, PromptVariables, ONTOLOGICAL_CLASSIFICATION,
    SCHEMA_GENERATION, SEGMENTATION, VOCABULARY_EXTRACTION,
};
pub use routing::ConfidenceIntegrator;
pub use segment::{segments_from_boundaries, SegmentationResponse, TheoryBoundary, TheorySegmenter};
pub use vocabulary::{ExtractedTerm, VocabularyExtractor, VocabularyResponse};
