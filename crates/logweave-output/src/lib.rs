//! LogWeave Output
//!
//! Line formatting, line sinks and batched shipping to external HTTP
//! collectors.

pub mod format;
pub mod shipper;
pub mod sink;

pub use format::Formatter;
pub use shipper::{BatchShipper, BatchSink, HttpSink, RetryPolicy};
pub use sink::{open_sink, FileSink, LineSink, MemorySink, NullSink, StderrSink, StdoutSink};
