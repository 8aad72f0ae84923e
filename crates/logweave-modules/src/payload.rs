use logweave_core::config::PayloadConfig;
use logweave_core::field::{
    Field, Fields, FileRef, DEPTH_SENTINEL, RESOURCE_PLACEHOLDER, UNSUPPORTED_PLACEHOLDER,
};
use logweave_core::{LogEntry, LogWeaveError, Processor, Result};
use tracing::warn;

/// Appended to strings cut at `max_string_length`
pub const TRUNCATED_SUFFIX: &str = "[TRUNCATED]";

/// Payload Processor
///
/// Bounds what an entry can carry: long strings are cut, deep nesting is
/// replaced by a sentinel, files become summaries and opaque handles become
/// placeholders.
pub struct PayloadProcessor {
    config: PayloadConfig,
}

impl PayloadProcessor {
    pub fn new(config: PayloadConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PayloadConfig::default())
    }

    /// Shape every entry of a map whose own depth is `depth`
    pub fn shape_fields(&self, fields: Fields, depth: usize) -> Fields {
        fields
            .into_iter()
            .map(|(key, value)| (key, self.shape_value(value, depth + 1)))
            .collect()
    }

    fn shape_value(&self, value: Field, depth: usize) -> Field {
        if depth > self.config.max_array_depth {
            return Field::Str(DEPTH_SENTINEL.to_string());
        }

        match value {
            Field::Str(s) => Field::Str(self.truncate(s)),
            Field::Map(map) => Field::Map(self.shape_fields(map, depth)),
            Field::List(items) => Field::List(
                items
                    .into_iter()
                    .map(|item| self.shape_value(item, depth + 1))
                    .collect(),
            ),
            Field::File(file) => Field::Map(self.summarize_file(&file)),
            Field::Resource(_) => Field::Str(RESOURCE_PLACEHOLDER.to_string()),
            Field::Shared(shared) => match shared.snapshot() {
                Some(inner @ Field::Shared(_)) => self.shape_value(inner, depth + 1),
                Some(inner) => self.shape_value(inner, depth),
                None => {
                    let err = LogWeaveError::MalformedPayload {
                        path: format!("depth {}", depth),
                        reason: "shared value is poisoned".to_string(),
                    };
                    warn!(error = %err, "Replacing unreadable payload value");
                    Field::Str(UNSUPPORTED_PLACEHOLDER.to_string())
                }
            },
            other => other,
        }
    }

    fn truncate(&self, value: String) -> String {
        let max = self.config.max_string_length;
        match value.char_indices().nth(max) {
            Some((cut, _)) => {
                let mut truncated = value[..cut].to_string();
                truncated.push_str(TRUNCATED_SUFFIX);
                truncated
            }
            None => value,
        }
    }

    fn summarize_file(&self, file: &FileRef) -> Fields {
        let mut summary = Fields::new();
        summary.insert("type".to_string(), Field::from("file"));
        summary.insert("name".to_string(), Field::Str(file.name()));

        if !self.config.summarize_uploads {
            return summary;
        }

        let size_kb = (file.size_bytes as f64 / 1024.0 * 100.0).round() / 100.0;
        let mime = file
            .mime
            .clone()
            .or_else(|| guess_mime(&file.name()).map(str::to_string));

        summary.insert("size_kb".to_string(), Field::Float(size_kb));
        summary.insert("mime".to_string(), Field::from(mime));
        summary.insert(
            "exceeds_limit".to_string(),
            Field::Bool(size_kb > self.config.max_file_size_kb as f64),
        );
        summary
    }
}

/// Best-effort MIME type from a file name's extension
pub fn guess_mime(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}

impl Processor for PayloadProcessor {
    fn name(&self) -> &'static str {
        "payload"
    }

    fn process(&self, mut entry: LogEntry) -> Result<LogEntry> {
        entry.context = self.shape_fields(entry.context, 0);
        entry.metrics = self.shape_fields(entry.metrics, 0);
        Ok(entry)
    }
}
