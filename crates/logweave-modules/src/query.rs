//! Model event to query correlation.
//!
//! A domain model event ("User created") is remembered until the next query
//! executes. If that query runs within the correlation window the two are
//! reported together as one model operation. This is a heuristic: nothing
//! ties the query to the event other than timing.

use logweave_core::Field;
use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a model event waits for its query
pub const CORRELATION_WINDOW: Duration = Duration::from_millis(100);

/// Map a model event name to the operation verb it implies.
/// Unknown events are used verbatim.
pub fn verb_for_event(event: &str) -> String {
    let event = event.trim();
    match event {
        "created" => "insert",
        "updated" => "update",
        "deleted" => "delete",
        "retrieved" => "select",
        "saved" => "save",
        "restored" => "restore",
        "forceDeleted" => "forceDelete",
        other => other,
    }
    .to_string()
}

/// Best-effort number of records a statement touches
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCount {
    Exact(u64),
    /// A select without a single-row limit
    Multiple,
    /// An update or delete; only the driver result would know
    Affected,
    Unknown,
}

impl From<&RecordCount> for Field {
    fn from(count: &RecordCount) -> Self {
        match count {
            RecordCount::Exact(n) => Field::UInt(*n),
            RecordCount::Multiple => Field::from("(multiple)"),
            RecordCount::Affected => Field::from("(affected)"),
            RecordCount::Unknown => Field::Null,
        }
    }
}

static LIMIT_ONE_REGEX: OnceLock<Regex> = OnceLock::new();

fn limit_one_regex() -> &'static Regex {
    LIMIT_ONE_REGEX.get_or_init(|| Regex::new(r"(?i)\blimit\s+1\b").expect("valid regex"))
}

/// Estimate the record count from the statement's shape
pub fn estimate_record_count(sql: &str) -> RecordCount {
    let lower = sql.trim_start().to_lowercase();

    if lower.starts_with("select") {
        if limit_one_regex().is_match(&lower) {
            RecordCount::Exact(1)
        } else {
            RecordCount::Multiple
        }
    } else if lower.starts_with("insert") {
        let compact: String = lower.split_whitespace().collect();
        if compact.starts_with("insertinto") && compact.matches('(').count() > 1 {
            RecordCount::Exact(compact.matches("),(").count() as u64 + 1)
        } else {
            RecordCount::Exact(1)
        }
    } else if lower.starts_with("update") || lower.starts_with("delete") {
        RecordCount::Affected
    } else {
        RecordCount::Unknown
    }
}

fn render_binding(binding: &Field) -> String {
    match binding {
        Field::Null => "NULL".to_string(),
        Field::Bool(true) => "TRUE".to_string(),
        Field::Bool(false) => "FALSE".to_string(),
        Field::Int(n) => n.to_string(),
        Field::UInt(n) => n.to_string(),
        Field::Float(n) => n.to_string(),
        Field::Str(s) => {
            let mut quoted = String::with_capacity(s.len() + 2);
            quoted.push('\'');
            for c in s.chars() {
                match c {
                    '\'' | '"' | '\\' => {
                        quoted.push('\\');
                        quoted.push(c);
                    }
                    '\0' => quoted.push_str("\\0"),
                    c => quoted.push(c),
                }
            }
            quoted.push('\'');
            quoted
        }
        other => format!("'{}'", other.to_json()),
    }
}

/// Substitute positional `?` placeholders with rendered bindings.
/// Placeholders without a binding are left in place.
pub fn interpolate_sql(sql: &str, bindings: &[Field]) -> String {
    let mut rendered = String::with_capacity(sql.len());
    let mut bindings = bindings.iter();

    for c in sql.chars() {
        if c != '?' {
            rendered.push(c);
            continue;
        }
        match bindings.next() {
            Some(binding) => rendered.push_str(&render_binding(binding)),
            None => rendered.push('?'),
        }
    }
    rendered
}

/// An executed statement as reported by the database layer
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecuted {
    pub sql: String,
    pub bindings: Vec<Field>,
    pub duration_ms: f64,
    pub connection: String,
}

impl QueryExecuted {
    pub fn new(sql: impl Into<String>, bindings: Vec<Field>, duration_ms: f64) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            duration_ms,
            connection: "default".to_string(),
        }
    }

    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }
}

/// A model operation paired with the query that implemented it
#[derive(Debug, Clone, PartialEq)]
pub struct ModelQuery {
    pub model: String,
    pub verb: String,
    /// The statement with bindings substituted
    pub sql: String,
    pub bindings: Vec<Field>,
    pub duration_ms: f64,
    pub record_count: RecordCount,
    pub connection: String,
}

impl ModelQuery {
    /// `MODEL/<Model>/<verb>`
    pub fn section(&self) -> String {
        format!("MODEL/{}/{}", self.model, self.verb)
    }

    pub fn message(&self) -> String {
        format!("Model {} {} operation", self.model, self.verb)
    }
}

#[derive(Debug)]
struct PendingEvent {
    model: String,
    verb: String,
    at: Instant,
}

/// Holds at most one pending model event per unit of work
#[derive(Debug)]
pub struct QueryCorrelator {
    pending: Option<PendingEvent>,
    window: Duration,
}

impl QueryCorrelator {
    pub fn new() -> Self {
        Self::with_window(CORRELATION_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            pending: None,
            window,
        }
    }

    /// Remember a model event. `model` may be a qualified type path; only the
    /// last segment is kept.
    pub fn record_model_event(&mut self, model: &str, event: &str) {
        let model = model
            .rsplit(|c| c == '\\' || c == ':' || c == '.')
            .next()
            .unwrap_or(model);

        self.pending = Some(PendingEvent {
            model: model.to_string(),
            verb: verb_for_event(event),
            at: Instant::now(),
        });
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Pair a query with the pending event. The event is consumed either way.
    pub fn correlate(&mut self, query: QueryExecuted) -> Option<ModelQuery> {
        let pending = self.pending.take()?;

        if pending.at.elapsed() > self.window {
            debug!(model = %pending.model, verb = %pending.verb, "Model event expired before its query");
            return None;
        }

        Some(ModelQuery {
            record_count: estimate_record_count(&query.sql),
            sql: interpolate_sql(&query.sql, &query.bindings),
            model: pending.model,
            verb: pending.verb,
            bindings: query.bindings,
            duration_ms: query.duration_ms,
            connection: query.connection,
        })
    }
}

impl Default for QueryCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_bindings() {
        let sql = interpolate_sql(
            "SELECT * FROM users WHERE id = ? AND status = ?",
            &[Field::Int(1), Field::from("active")],
        );
        assert_eq!(sql, "SELECT * FROM users WHERE id = 1 AND status = 'active'");
    }

    #[test]
    fn test_interpolate_null_and_bool() {
        assert_eq!(
            interpolate_sql("SELECT * FROM users WHERE deleted_at IS ?", &[Field::Null]),
            "SELECT * FROM users WHERE deleted_at IS NULL"
        );
        assert_eq!(
            interpolate_sql("SELECT * FROM users WHERE active = ?", &[Field::Bool(true)]),
            "SELECT * FROM users WHERE active = TRUE"
        );
    }

    #[test]
    fn test_interpolate_escapes_and_missing() {
        assert_eq!(
            interpolate_sql("UPDATE t SET a = ?, b = ?", &[Field::from("it's")]),
            "UPDATE t SET a = 'it\\'s', b = ?"
        );
    }

    #[test]
    fn test_estimate_record_count() {
        assert_eq!(estimate_record_count("select * from users limit 1"), RecordCount::Exact(1));
        assert_eq!(estimate_record_count("select * from users limit 10"), RecordCount::Multiple);
        assert_eq!(
            estimate_record_count("insert into users (name) values (?)"),
            RecordCount::Exact(1)
        );
        assert_eq!(
            estimate_record_count("insert into users (name) values (?), (?), (?)"),
            RecordCount::Exact(3)
        );
        assert_eq!(estimate_record_count("DELETE FROM users"), RecordCount::Affected);
        assert_eq!(estimate_record_count("vacuum"), RecordCount::Unknown);
    }

    #[test]
    fn test_verb_map() {
        assert_eq!(verb_for_event("created"), "insert");
        assert_eq!(verb_for_event("forceDeleted"), "forceDelete");
        assert_eq!(verb_for_event("booted"), "booted");
    }

    #[test]
    fn test_correlate_within_window() {
        let mut correlator = QueryCorrelator::new();
        correlator.record_model_event("App\\Models\\User", "created");

        let query = QueryExecuted::new("insert into users (name) values (?)", vec![Field::from("ada")], 1.5)
            .on_connection("sqlite");
        let model_query = correlator.correlate(query).unwrap();

        assert_eq!(model_query.section(), "MODEL/User/insert");
        assert_eq!(model_query.message(), "Model User insert operation");
        assert_eq!(model_query.sql, "insert into users (name) values ('ada')");
        assert_eq!(model_query.record_count, RecordCount::Exact(1));
        assert_eq!(model_query.connection, "sqlite");
        assert!(!correlator.has_pending());
    }

    #[test]
    fn test_event_consumed_once() {
        let mut correlator = QueryCorrelator::new();
        correlator.record_model_event("User", "retrieved");
        assert!(correlator.correlate(QueryExecuted::new("select 1", vec![], 0.1)).is_some());
        assert!(correlator.correlate(QueryExecuted::new("select 1", vec![], 0.1)).is_none());
    }

    #[test]
    fn test_expired_event_ignored() {
        let mut correlator = QueryCorrelator::with_window(Duration::ZERO);
        correlator.record_model_event("User", "updated");
        std::thread::sleep(Duration::from_millis(2));
        assert!(correlator
            .correlate(QueryExecuted::new("update users set a = 1", vec![], 0.1))
            .is_none());
        assert!(!correlator.has_pending());
    }

    #[test]
    fn test_no_event_no_match() {
        let mut correlator = QueryCorrelator::default();
        assert!(correlator.correlate(QueryExecuted::new("select 1", vec![], 0.1)).is_none());
    }
}
