use logweave_core::config::{Config, LogFormat};
use logweave_core::sequence::format_sequence;
use logweave_core::{Fields, LogEntry, OutputError};

/// Renders entries to single output lines
#[derive(Debug, Clone)]
pub struct Formatter {
    format: LogFormat,
    channel: String,
}

impl Formatter {
    pub fn new(format: LogFormat, channel: impl Into<String>) -> Self {
        Self {
            format,
            channel: channel.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.format, config.channel.clone())
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Render an entry. Blank entries (no message, context or metrics)
    /// render to an empty string, which callers must not write.
    pub fn render(&self, entry: &LogEntry) -> Result<String, OutputError> {
        if entry.is_blank() {
            return Ok(String::new());
        }

        match self.format {
            LogFormat::Json => self.render_json(entry),
            LogFormat::Text => self.render_text(entry),
        }
    }

    fn render_json(&self, entry: &LogEntry) -> Result<String, OutputError> {
        serde_json::to_string(entry).map_err(|e| OutputError::Serialization(e.to_string()))
    }

    /// `[ts] channel.LEVEL: [trace:seq] [SECTION] message {merged context+metrics}`
    fn render_text(&self, entry: &LogEntry) -> Result<String, OutputError> {
        let trace_id = if entry.trace_id.is_empty() {
            "unknown"
        } else {
            entry.trace_id.as_str()
        };
        let req_seq = if entry.req_seq.is_empty() {
            format_sequence(0)
        } else {
            entry.req_seq.clone()
        };

        let header = format!(
            "[{}] {}.{}: [{}:{}] {} {}",
            entry.formatted_timestamp(),
            self.channel,
            entry.level,
            trace_id,
            req_seq,
            entry.section,
            entry.message
        );

        if entry.context.is_empty() && entry.metrics.is_empty() {
            return Ok(header);
        }

        // Metrics win over context on key collisions
        let mut data: Fields = entry.context.clone();
        data.extend(entry.metrics.iter().map(|(k, v)| (k.clone(), v.clone())));

        let json =
            serde_json::to_string(&data).map_err(|e| OutputError::Serialization(e.to_string()))?;
        Ok(format!("{} {}", header, json))
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(LogFormat::default(), "logweave")
    }
}
