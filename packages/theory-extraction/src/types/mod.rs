//! Data types for the theory extraction pipeline.

pub mod config;
pub mod document;
pub mod model_type;
pub mod ontology;
pub mod report;
pub mod routing;
pub mod schema;
pub mod vocabulary;
