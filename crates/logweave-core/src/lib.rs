//! LogWeave Core
//!
//! Core types, configuration and per-unit correlation state for the LogWeave
//! structured logging pipeline.

pub mod config;
pub mod correlation;
pub mod error;
pub mod field;
pub mod log_entry;
pub mod sequence;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use correlation::{CorrelationContext, TraceId, UnitKind, PROVISIONAL_PREFIX};
pub use error::{LogWeaveError, OutputError, Result};
pub use field::{fields_from_json, Field, Fields, FileRef, SharedField};
pub use log_entry::{CorrelationSnapshot, LogEntry, LogLevel};
pub use sequence::{CounterStore, FileCounterStore, MemoryCounterStore, SequenceCounter};
pub use traits::{PassthroughProcessor, Processor};
