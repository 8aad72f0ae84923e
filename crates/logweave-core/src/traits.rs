use crate::error::Result;
use crate::log_entry::LogEntry;

/// Trait for processors in the LogWeave pipeline
///
/// Each processor receives a built entry and returns a transformed copy.
/// Processors run in a fixed order, so later ones see the output of earlier
/// ones (redaction always runs before payload shaping).
pub trait Processor: Send + Sync {
    /// Returns the name of the processor (for diagnostics)
    fn name(&self) -> &'static str;

    /// Process a log entry and return the transformed result
    fn process(&self, entry: LogEntry) -> Result<LogEntry>;

    /// Check if the processor is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// A no-op processor that passes entries through unchanged
pub struct PassthroughProcessor;

impl Processor for PassthroughProcessor {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn process(&self, entry: LogEntry) -> Result<LogEntry> {
        Ok(entry)
    }
}
