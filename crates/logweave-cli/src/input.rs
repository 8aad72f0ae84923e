//! Turning stdin lines into log calls.

use logweave_core::{fields_from_json, Fields, LogLevel};
use serde_json::Value;

/// One line of input, ready to hand to the logger
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub context: Fields,
    pub metrics: Fields,
}

impl InputRecord {
    /// A JSON object line may carry `level`, `category`, `message`, `context`
    /// and `metrics`; anything else is logged verbatim as an info message.
    pub fn parse(line: &str, default_category: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(mut object)) => {
                let level = object
                    .get("level")
                    .and_then(Value::as_str)
                    .and_then(|l| l.parse().ok())
                    .unwrap_or(LogLevel::Info);
                let category = object
                    .get("category")
                    .and_then(Value::as_str)
                    .unwrap_or(default_category)
                    .to_string();
                let message = object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let context = object.remove("context").map(fields_from_json).unwrap_or_default();
                let metrics = object.remove("metrics").map(fields_from_json).unwrap_or_default();

                Self {
                    level,
                    category,
                    message,
                    context,
                    metrics,
                }
            }
            _ => Self::plain(line, default_category),
        }
    }

    fn plain(line: &str, category: &str) -> Self {
        Self {
            level: LogLevel::Info,
            category: category.to_string(),
            message: line.to_string(),
            context: Fields::new(),
            metrics: Fields::new(),
        }
    }
}
