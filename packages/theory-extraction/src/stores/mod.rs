//! Storage implementations for the pipeline.
//!
//! Available backends:
//! - `MemoryStore` - In-memory cache and artifact store (always available)

pub mod memory;

pub use memory::MemoryStore;
