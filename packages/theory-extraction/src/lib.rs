//! Theory Extraction Pipeline
//!
//! Turns academic papers describing social-science theories into structured
//! schema blueprints (graphs, hypergraphs, tables, sequences) through staged
//! calls to a text-completion service.
//!
//! # Design Philosophy
//!
//! **"The model suggests, the pipeline decides"**
//!
//! - Every completion is untrusted: validated against a typed schema, retried, cached
//! - Routing is a pure function of detector scores and explicit thresholds
//! - No vocabulary term is ever silently dropped
//! - Per-segment failures never abort the document
//!
//! # Usage
//!
//! ```rust,ignore
//! use theory_extraction::{Document, MemoryStore, PipelineOrchestrator};
//! use theory_extraction::testing::ScriptedClient;
//!
//! let client = ScriptedClient::new(); // or any CompletionClient
//! let orchestrator = PipelineOrchestrator::new(client, MemoryStore::new());
//!
//! let report = orchestrator.run(&Document::new("putnam-1995", text)).await;
//! for segment in &report.segments {
//!     println!("{}: {}", segment.segment_id, segment.status);
//! }
//! println!("{}", orchestrator.audit().to_json()?);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (CompletionClient, AnalysisCache, ArtifactStore)
//! - [`types`] - Documents, vocabulary, routing, ontology and schema types
//! - [`pipeline`] - The pipeline stages and the orchestrator
//! - [`stores`] - Storage implementations (MemoryStore)
//! - [`clients`] - Completion client wrappers (rate limiting)
//! - [`audit`] - Append-only audit trail
//! - [`testing`] - Scripted client for testing

pub mod audit;
pub mod clients;
pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use error::{CallError, CallResult, PipelineError, Result, SchemaIncompleteError};
pub use traits::{
    completion::{Completion, CompletionClient, CompletionContent},
    store::{
        AnalysisCache, ArtifactKey, ArtifactKind, ArtifactStore, CacheKey, PipelineStore,
        StoredArtifact,
    },
};
pub use types::{
    config::{PipelineConfig, RetryPolicy, RoutingThresholds},
    document::{Document, Segmentation, Span, TheorySegment},
    model_type::{CompatibilityMatrix, ModelType},
    ontology::{AssignmentSource, OntologyAssignment, OntologyCategory, GENERIC_ENTITY},
    report::{DocumentReport, SegmentReport, SegmentStatus},
    routing::{DetectorScore, ManualReviewReason, RoutingDecision, RoutingMode},
    schema::{
        ComposedSchema, Definition, EdgeType, NodeType, SchemaBlueprint, SchemaComponent,
        SchemaFragment, SchemaModel,
    },
    vocabulary::{normalize_term, TermVariant, Vocabulary, VocabularyTerm},
};

// Re-export the orchestrator and pipeline components
pub use pipeline::{
    // Orchestration
    PipelineOrchestrator,
    // Stages
    ConfidenceIntegrator, DetectorEnsemble, HybridComposer, LlmSchemaGenerator,
    OntologyClassifier, SchemaAssembler, SchemaGenerator, TheorySegmenter, VocabularyExtractor,
    // Prompts
    PromptTemplates,
};

// Re-export stores and clients
pub use clients::{CompletionClientExt, RateLimitedClient};
pub use stores::MemoryStore;

// Re-export testing utilities
pub use testing::ScriptedClient;
