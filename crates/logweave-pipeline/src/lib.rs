//! LogWeave Pipeline
//!
//! The shared processing pipeline and the per-unit structured logger that
//! feeds it.

pub mod logger;
pub mod pipeline;
pub mod sections;

pub use logger::StructuredLogger;
pub use pipeline::LogPipeline;
pub use sections::{CacheStats, DatabaseStats, ShutdownInfo, SlowQuery, StartupInfo};
