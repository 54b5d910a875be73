//! Core trait abstractions for the pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide the completion service and storage.

pub mod completion;
pub mod store;
