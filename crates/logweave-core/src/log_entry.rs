use crate::field::Fields;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// ISO-8601 with microseconds and a numeric offset, e.g. `2024-05-01T10:00:00.123456+02:00`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// Log level classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Notice => write!(f, "NOTICE"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Critical => write!(f, "CRITICAL"),
            LogLevel::Alert => write!(f, "ALERT"),
            LogLevel::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" | "fatal" => Ok(LogLevel::Critical),
            "alert" => Ok(LogLevel::Alert),
            "emergency" => Ok(LogLevel::Emergency),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// The correlation data embedded in every entry for trace reconstruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSnapshot {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub request_duration_ms: f64,
}

impl Default for CorrelationSnapshot {
    fn default() -> Self {
        Self {
            trace_id: String::new(),
            method: "UNKNOWN".to_string(),
            path: "/".to_string(),
            client_ip: "UNKNOWN".to_string(),
            request_duration_ms: 0.0,
        }
    }
}

/// A fully built log entry, ready for processing and formatting
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<FixedOffset>,

    pub trace_id: String,

    /// Zero-padded position within the trace
    pub req_seq: String,

    pub span_id: String,

    pub level: LogLevel,

    /// Bracketed category label, e.g. `[DATABASE]`
    pub section: String,

    pub message: String,

    pub context: Fields,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: Fields,

    pub correlation: CorrelationSnapshot,
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<FixedOffset>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}

impl LogEntry {
    /// Create an entry stamped with the local time. The category is bracketed
    /// unless it already is.
    pub fn new(level: LogLevel, category: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            trace_id: String::new(),
            req_seq: String::new(),
            span_id: String::new(),
            level,
            section: section_label(category),
            message: message.into(),
            context: Fields::new(),
            metrics: Fields::new(),
            correlation: CorrelationSnapshot::default(),
        }
    }

    /// Attach trace identity and position
    pub fn with_trace(
        mut self,
        trace_id: impl Into<String>,
        req_seq: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        self.trace_id = trace_id.into();
        self.req_seq = req_seq.into();
        self.span_id = span_id.into();
        self
    }

    pub fn with_context(mut self, context: Fields) -> Self {
        self.context = context;
        self
    }

    pub fn with_metrics(mut self, metrics: Fields) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationSnapshot) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The section without its brackets
    pub fn category(&self) -> &str {
        self.section
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(&self.section)
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// True when there is nothing worth printing
    pub fn is_blank(&self) -> bool {
        self.message.is_empty() && self.context.is_empty() && self.metrics.is_empty()
    }
}

fn section_label(category: &str) -> String {
    if category.starts_with('[') && category.ends_with(']') {
        category.to_string()
    } else {
        format!("[{}]", category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{fields_from_json, Field};
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Critical < LogLevel::Emergency);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("notice".parse::<LogLevel>().unwrap(), LogLevel::Notice);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_section_is_bracketed_once() {
        let entry = LogEntry::new(LogLevel::Info, "DATABASE", "x");
        assert_eq!(entry.section, "[DATABASE]");
        assert_eq!(entry.category(), "DATABASE");

        let entry = LogEntry::new(LogLevel::Info, "[DATABASE]", "x");
        assert_eq!(entry.section, "[DATABASE]");
    }

    #[test]
    fn test_timestamp_format() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456+02:00").unwrap();
        let entry = LogEntry::new(LogLevel::Info, "STARTUP", "x").with_timestamp(timestamp);
        assert_eq!(entry.formatted_timestamp(), "2024-05-01T10:00:00.123456+02:00");
    }

    #[test]
    fn test_serialize_omits_empty_metrics() {
        let entry = LogEntry::new(LogLevel::Info, "STARTUP", "hello").with_trace(
            "trace-1",
            "0000000001",
            "span-1",
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("metrics").is_none());
        assert_eq!(value["context"], json!({}));
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["section"], "[STARTUP]");
        assert_eq!(value["correlation"]["method"], "UNKNOWN");
    }

    #[test]
    fn test_serialize_keeps_metrics() {
        let entry = LogEntry::new(LogLevel::Warning, "DATABASE", "Slow query")
            .with_metrics(fields_from_json(json!({"duration_ms": 523.5})));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["metrics"]["duration_ms"], 523.5);
    }

    #[test]
    fn test_is_blank() {
        let entry = LogEntry::new(LogLevel::Info, "X", "");
        assert!(entry.is_blank());

        let mut entry = LogEntry::new(LogLevel::Info, "X", "");
        entry.context.insert("k".to_string(), Field::Bool(true));
        assert!(!entry.is_blank());
    }
}
