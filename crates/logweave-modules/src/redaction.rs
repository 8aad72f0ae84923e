use aho_corasick::AhoCorasick;
use logweave_core::config::{RedactionConfig, RedactionMode};
use logweave_core::field::{Field, Fields, DEPTH_SENTINEL, MAX_NESTING_DEPTH, UNSUPPORTED_PLACEHOLDER};
use logweave_core::{CorrelationSnapshot, LogEntry, Processor, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Replaces sensitive values in `remove` mode
pub const REDACTED_SENTINEL: &str = "[REDACTED]";

/// Redaction Processor
///
/// Masks sensitive values in context, metrics and the correlation snapshot:
/// - keys containing a configured pattern (case-insensitive)
/// - keys starting with a well-known secret prefix (smart detection)
/// - string values shaped like emails, card numbers or bearer tokens (smart detection)
pub struct RedactionProcessor {
    config: RedactionConfig,
    key_detector: Option<AhoCorasick>,
    max_depth: usize,
}

static SMART_KEY_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static CARD_NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();
static BEARER_REGEX: OnceLock<Regex> = OnceLock::new();

fn smart_key_regex() -> &'static Regex {
    SMART_KEY_REGEX.get_or_init(|| {
        Regex::new(r"^(password|passwd|pwd|secret|token|auth|api_key|key)").expect("valid regex")
    })
}

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("valid regex")
    })
}

fn card_number_regex() -> &'static Regex {
    CARD_NUMBER_REGEX.get_or_init(|| Regex::new(r"^\d{13,19}$").expect("valid regex"))
}

fn bearer_regex() -> &'static Regex {
    BEARER_REGEX.get_or_init(|| Regex::new(r"^Bearer\s+[a-zA-Z0-9\-_.]+").expect("valid regex"))
}

/// Keep the first and last character and mask the rest.
/// Strings of two characters or fewer are masked entirely.
pub fn mask_string(value: &str, mask_char: char) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 {
        return std::iter::repeat(mask_char).take(chars.len()).collect();
    }

    let mut masked = String::with_capacity(value.len());
    masked.push(chars[0]);
    masked.extend(std::iter::repeat(mask_char).take(chars.len() - 2));
    masked.push(chars[chars.len() - 1]);
    masked
}

impl RedactionProcessor {
    /// Create a new redaction processor with the given configuration
    pub fn new(config: RedactionConfig) -> Self {
        let patterns: Vec<String> = config
            .patterns
            .iter()
            .chain(config.custom_keys.iter())
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let key_detector = if patterns.is_empty() {
            None
        } else {
            match AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&patterns)
            {
                Ok(detector) => Some(detector),
                Err(e) => {
                    warn!(error = %e, "Failed to build redaction key matcher, key patterns disabled");
                    None
                }
            }
        };

        debug!(patterns = patterns.len(), smart = config.smart_detection, "Redaction processor ready");

        Self {
            config,
            key_detector,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RedactionConfig::default())
    }

    /// Bound the walk at the given nesting depth (clamped to the global ceiling)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_NESTING_DEPTH);
        self
    }

    /// Check if a key names sensitive data
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let lower = key.to_lowercase();

        if let Some(detector) = &self.key_detector {
            if detector.is_match(&lower) {
                return true;
            }
        }

        self.config.smart_detection && smart_key_regex().is_match(&lower)
    }

    /// Check if a string value looks sensitive regardless of its key
    pub fn is_sensitive_value(&self, value: &str) -> bool {
        if !self.config.smart_detection {
            return false;
        }

        email_regex().is_match(value)
            || card_number_regex().is_match(&value.replace(' ', ""))
            || bearer_regex().is_match(value)
    }

    fn mask_text(&self, value: &str) -> String {
        match self.config.mode {
            RedactionMode::Remove => REDACTED_SENTINEL.to_string(),
            RedactionMode::Mask => mask_string(value, self.config.mask_char),
        }
    }

    fn mask_value(&self, value: &Field) -> Field {
        match (self.config.mode, value) {
            (RedactionMode::Remove, _) => Field::Str(REDACTED_SENTINEL.to_string()),
            (RedactionMode::Mask, Field::Str(s)) => Field::Str(mask_string(s, self.config.mask_char)),
            (RedactionMode::Mask, _) => Field::Str(self.config.mask_char.to_string()),
        }
    }

    /// Redact every entry of a map whose own depth is `depth`
    pub fn redact_fields(&self, fields: Fields, depth: usize) -> Fields {
        fields
            .into_iter()
            .map(|(key, value)| {
                let value = if self.is_sensitive_key(&key) {
                    self.mask_value(&value)
                } else {
                    self.redact_value(value, depth + 1)
                };
                (key, value)
            })
            .collect()
    }

    fn redact_value(&self, value: Field, depth: usize) -> Field {
        if depth > self.max_depth {
            return Field::Str(DEPTH_SENTINEL.to_string());
        }

        match value {
            Field::Map(map) => Field::Map(self.redact_fields(map, depth)),
            Field::List(items) => Field::List(
                items
                    .into_iter()
                    .map(|item| self.redact_value(item, depth + 1))
                    .collect(),
            ),
            // A node pointing straight at another node costs a level, so a
            // self-referential chain still reaches the depth bound.
            Field::Shared(shared) => match shared.snapshot() {
                Some(inner @ Field::Shared(_)) => self.redact_value(inner, depth + 1),
                Some(inner) => self.redact_value(inner, depth),
                None => Field::Str(UNSUPPORTED_PLACEHOLDER.to_string()),
            },
            Field::Str(s) if self.is_sensitive_value(&s) => Field::Str(self.mask_text(&s)),
            other => other,
        }
    }

    fn redact_snapshot(&self, mut snapshot: CorrelationSnapshot) -> CorrelationSnapshot {
        for (key, value) in [
            ("trace_id", &mut snapshot.trace_id),
            ("method", &mut snapshot.method),
            ("path", &mut snapshot.path),
            ("client_ip", &mut snapshot.client_ip),
        ] {
            if self.is_sensitive_key(key) || self.is_sensitive_value(value) {
                *value = self.mask_text(value);
            }
        }
        snapshot
    }
}

impl Processor for RedactionProcessor {
    fn name(&self) -> &'static str {
        "redaction"
    }

    fn process(&self, mut entry: LogEntry) -> Result<LogEntry> {
        if !self.config.enabled {
            return Ok(entry);
        }

        entry.context = self.redact_fields(entry.context, 0);
        entry.metrics = self.redact_fields(entry.metrics, 0);
        entry.correlation = self.redact_snapshot(entry.correlation);

        Ok(entry)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
