//! LogWeave Modules
//!
//! Entry processors for the LogWeave pipeline. Redaction runs first, then
//! payload shaping; the query correlator feeds the logger's model query
//! section.

pub mod payload;
pub mod query;
pub mod redaction;

// Re-export the core Processor trait for convenience
pub use logweave_core::{PassthroughProcessor, Processor};

pub use payload::PayloadProcessor;
pub use query::{ModelQuery, QueryCorrelator, QueryExecuted, RecordCount};
pub use redaction::RedactionProcessor;
