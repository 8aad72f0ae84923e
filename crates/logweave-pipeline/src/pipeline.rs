use crate::logger::StructuredLogger;
use logweave_core::config::LogFormat;
use logweave_core::{
    Config, CounterStore, LogEntry, LogLevel, LogWeaveError, MemoryCounterStore, Processor, Result,
};
use logweave_modules::{PayloadProcessor, RedactionProcessor};
use logweave_output::{open_sink, BatchShipper, BatchSink, Formatter, HttpSink, LineSink};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Shared processing chain: processors, formatter, line sink and optional
/// batch shipper. One pipeline serves many units of work; each unit gets its
/// own [`StructuredLogger`] through [`LogPipeline::begin_unit`].
pub struct LogPipeline {
    config: Config,
    min_level: LogLevel,
    processors: Vec<Box<dyn Processor>>,
    formatter: Formatter,
    sink: Mutex<Box<dyn LineSink>>,
    shipper: Option<BatchShipper>,
    counter_store: Arc<dyn CounterStore>,
}

impl LogPipeline {
    /// Create a pipeline with no processors writing to the given sink
    pub fn new(config: Config, sink: Box<dyn LineSink>) -> Result<Self> {
        config.validate()?;
        let min_level = config.min_level()?;

        Ok(Self {
            formatter: Formatter::from_config(&config),
            config,
            min_level,
            processors: Vec::new(),
            sink: Mutex::new(sink),
            shipper: None,
            counter_store: Arc::new(MemoryCounterStore::new()),
        })
    }

    /// Create a pipeline from configuration.
    ///
    /// Redaction runs before payload shaping. When async shipping is enabled
    /// this must be called inside a tokio runtime.
    pub fn from_config(config: Config) -> Result<Self> {
        let sink = open_sink(&config.output)?;
        let mut pipeline = Self::new(config, sink)?;

        let redaction = RedactionProcessor::new(pipeline.config.redaction.clone())
            .with_max_depth(pipeline.config.payload.max_array_depth);
        let payload = PayloadProcessor::new(pipeline.config.payload.clone());
        pipeline = pipeline.add_processor(redaction).add_processor(payload);

        if pipeline.config.async_shipping.enabled {
            let sinks = pipeline
                .config
                .external_handlers
                .iter()
                .map(|handler| HttpSink::new(handler).map(|s| Arc::new(s) as Arc<dyn BatchSink>))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let shipper = BatchShipper::new(&pipeline.config.async_shipping, sinks)?;
            pipeline = pipeline.with_shipper(shipper);
        }

        Ok(pipeline)
    }

    /// Add a processor to the end of the chain
    pub fn add_processor<P: Processor + 'static>(mut self, processor: P) -> Self {
        info!(processor = processor.name(), "Adding processor to pipeline");
        self.processors.push(Box::new(processor));
        self
    }

    pub fn with_shipper(mut self, shipper: BatchShipper) -> Self {
        self.shipper = Some(shipper);
        self
    }

    /// Use a shared counter store so sequences can outlive one process
    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = store;
        self
    }

    /// Start a unit of work with its own correlation context
    pub fn begin_unit(self: &Arc<Self>) -> StructuredLogger {
        StructuredLogger::new(Arc::clone(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Value of the configured trace id header, if present and non-empty
    pub fn trace_hint<'a, I>(&self, headers: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let wanted = self.config.trace_id_header.as_str();
        headers
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn counter_store(&self) -> Arc<dyn CounterStore> {
        Arc::clone(&self.counter_store)
    }

    /// Run an entry through all enabled processors
    pub fn process(&self, mut entry: LogEntry) -> Result<LogEntry> {
        for processor in &self.processors {
            if !processor.is_enabled() {
                debug!(processor = processor.name(), "Skipping disabled processor");
                continue;
            }

            entry = processor.process(entry).map_err(|e| {
                warn!(processor = processor.name(), error = %e, "Processor failed");
                LogWeaveError::Processor {
                    processor: processor.name().to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        Ok(entry)
    }

    /// Process, render and write an entry, then queue it for shipping.
    /// Returns the processed entry.
    pub fn emit(&self, entry: LogEntry) -> Result<LogEntry> {
        let entry = self.process(entry)?;

        let line = self.formatter.render(&entry)?;
        if !line.is_empty() {
            self.write_line(&line)?;
        }

        if let Some(shipper) = &self.shipper {
            shipper.push(entry.clone());
        }

        Ok(entry)
    }

    /// Blank line between units of work in text output
    pub fn write_separator(&self) {
        if self.formatter.format() != LogFormat::Text {
            return;
        }
        if let Err(e) = self.write_line("") {
            warn!(error = %e, "Failed to write unit separator");
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| LogWeaveError::Pipeline("line sink lock poisoned".to_string()))?;
        sink.write_line(line)?;
        Ok(())
    }

    /// Flush the line sink and hand any buffered entries to the shipper
    pub fn flush(&self) {
        match self.sink.lock() {
            Ok(mut sink) => {
                if let Err(e) = sink.flush() {
                    warn!(error = %e, "Failed to flush line sink");
                }
            }
            Err(_) => warn!("Line sink lock poisoned, skipping flush"),
        }

        if let Some(shipper) = &self.shipper {
            shipper.flush();
        }
    }

    /// Flush everything and wait for in-flight deliveries
    pub async fn shutdown(&self) {
        self.flush();
        if let Some(shipper) = &self.shipper {
            shipper.shutdown().await;
        }
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logweave_core::config::{ExternalHandlerConfig, OutputTarget};
    use logweave_core::{fields_from_json, PassthroughProcessor};
    use logweave_output::MemorySink;
    use serde_json::json;

    fn memory_pipeline(config: Config) -> (LogPipeline, MemorySink) {
        let sink = MemorySink::new();
        let pipeline = LogPipeline::new(config, Box::new(sink.clone())).unwrap();
        (pipeline, sink)
    }

    #[test]
    fn test_empty_pipeline() {
        let (pipeline, sink) = memory_pipeline(Config::default());
        assert_eq!(pipeline.processor_count(), 0);

        let entry = LogEntry::new(LogLevel::Info, "TEST", "hello");
        let result = pipeline.emit(entry).unwrap();
        assert_eq!(result.message, "hello");
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_pipeline_with_passthrough() {
        let (pipeline, _) = memory_pipeline(Config::default());
        let pipeline = pipeline.add_processor(PassthroughProcessor);
        assert_eq!(pipeline.processor_names(), vec!["passthrough"]);
    }

    #[test]
    fn test_from_config_orders_processors() {
        let mut config = Config::default();
        config.output.target = OutputTarget::None;
        let pipeline = LogPipeline::from_config(config).unwrap();
        assert_eq!(pipeline.processor_names(), vec!["redaction", "payload"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            level: "loud".to_string(),
            ..Config::default()
        };
        let result = LogPipeline::new(config, Box::new(MemorySink::new()));
        assert!(matches!(result, Err(LogWeaveError::Config(_))));
    }

    #[test]
    fn test_async_shipping_requires_runtime() {
        let mut config = Config::default();
        config.output.target = OutputTarget::None;
        config.async_shipping.enabled = true;
        config.external_handlers = vec![ExternalHandlerConfig::default()];

        let result = LogPipeline::from_config(config);
        assert!(matches!(result, Err(LogWeaveError::Output(_))));
    }

    #[test]
    fn test_blank_entry_not_written() {
        let (pipeline, sink) = memory_pipeline(Config::default());
        pipeline.emit(LogEntry::new(LogLevel::Info, "X", "")).unwrap();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_separator_only_in_text_format() {
        let (pipeline, sink) = memory_pipeline(Config::default());
        pipeline.write_separator();
        assert!(sink.lines().is_empty());

        let config = Config {
            format: LogFormat::Text,
            ..Config::default()
        };
        let (pipeline, sink) = memory_pipeline(config);
        pipeline.write_separator();
        assert_eq!(sink.lines(), vec![String::new()]);
    }

    #[test]
    fn test_redaction_before_payload() {
        let mut config = Config::default();
        config.output.target = OutputTarget::None;
        config.payload.max_string_length = 4;
        let pipeline = LogPipeline::from_config(config).unwrap();

        let entry = LogEntry::new(LogLevel::Info, "TEST", "m")
            .with_context(fields_from_json(json!({"password": "secret123"})));
        let entry = pipeline.process(entry).unwrap();

        assert_eq!(entry.context["password"].as_str(), Some("s***[TRUNCATED]"));
    }
}
