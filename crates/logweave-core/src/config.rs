use crate::error::LogWeaveError;
use crate::field::MAX_NESTING_DEPTH;
use crate::log_entry::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for LogWeave
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global on/off switch; when false `log()` produces nothing
    pub enabled: bool,

    /// Channel name printed in text lines (`<channel>.<LEVEL>:`)
    pub channel: String,

    /// Minimum level: debug, info, notice, warning, error, critical, alert, emergency
    pub level: String,

    /// Line format
    pub format: LogFormat,

    /// Inbound header carrying an upstream trace id
    pub trace_id_header: String,

    /// Where formatted lines are written
    pub output: OutputConfig,

    /// Sensitive data masking
    pub redaction: RedactionConfig,

    /// String and nesting limits
    pub payload: PayloadConfig,

    /// Batching for external handlers
    pub async_shipping: AsyncShippingConfig,

    /// Per-category toggles
    pub sections: SectionsConfig,

    /// Model event to query correlation
    pub model_query: ModelQueryConfig,

    /// Console and job units of work
    pub non_http_context: NonHttpContextConfig,

    /// External endpoints receiving batches
    pub external_handlers: Vec<ExternalHandlerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "logweave".to_string(),
            level: "debug".to_string(),
            format: LogFormat::default(),
            trace_id_header: "X-Trace-Id".to_string(),
            output: OutputConfig::default(),
            redaction: RedactionConfig::default(),
            payload: PayloadConfig::default(),
            async_shipping: AsyncShippingConfig::default(),
            sections: SectionsConfig::default(),
            model_query: ModelQueryConfig::default(),
            non_http_context: NonHttpContextConfig::default(),
            external_handlers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, LogWeaveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogWeaveError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, LogWeaveError> {
        toml::from_str(content)
            .map_err(|e| LogWeaveError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, LogWeaveError> {
        toml::to_string_pretty(self)
            .map_err(|e| LogWeaveError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `LOGWEAVE_*` overrides from a variable lookup (usually `std::env::var`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enabled) = lookup("LOGWEAVE_ENABLED").and_then(|v| parse_bool(&v)) {
            self.enabled = enabled;
        }
        if let Some(level) = lookup("LOGWEAVE_LEVEL") {
            self.level = level;
        }
        if let Some(format) = lookup("LOGWEAVE_FORMAT") {
            match format.to_lowercase().as_str() {
                "json" => self.format = LogFormat::Json,
                "text" => self.format = LogFormat::Text,
                _ => {}
            }
        }
        if let Some(keys) = lookup("LOGWEAVE_REDACT_KEYS") {
            self.redaction.custom_keys.extend(
                keys.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from),
            );
        }
        if let Some(enabled) = lookup("LOGWEAVE_ASYNC_ENABLED").and_then(|v| parse_bool(&v)) {
            self.async_shipping.enabled = enabled;
        }
    }

    /// The parsed minimum level
    pub fn min_level(&self) -> Result<LogLevel, LogWeaveError> {
        self.level.parse().map_err(LogWeaveError::Config)
    }

    /// Check invariants that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), LogWeaveError> {
        self.min_level()?;

        if self.channel.trim().is_empty() {
            return Err(LogWeaveError::Config("channel must not be empty".to_string()));
        }

        if self.output.target == OutputTarget::File && self.output.path.trim().is_empty() {
            return Err(LogWeaveError::Config(
                "output.path is required when output.target = \"file\"".to_string(),
            ));
        }

        if self.payload.max_string_length == 0 {
            return Err(LogWeaveError::Config(
                "payload.max_string_length must be at least 1".to_string(),
            ));
        }

        if self.payload.max_array_depth == 0 || self.payload.max_array_depth > MAX_NESTING_DEPTH {
            return Err(LogWeaveError::Config(format!(
                "payload.max_array_depth must be between 1 and {}",
                MAX_NESTING_DEPTH
            )));
        }

        if self.async_shipping.enabled {
            if self.async_shipping.batch_size == 0 {
                return Err(LogWeaveError::Config(
                    "async_shipping.batch_size must be at least 1".to_string(),
                ));
            }
            if self.async_shipping.batch_timeout_ms == 0 {
                return Err(LogWeaveError::Config(
                    "async_shipping.batch_timeout_ms must be greater than 0".to_string(),
                ));
            }
            if self.external_handlers.is_empty() {
                return Err(LogWeaveError::Config(
                    "async_shipping is enabled but no external_handlers are configured".to_string(),
                ));
            }
        }

        for (index, handler) in self.external_handlers.iter().enumerate() {
            handler.validate().map_err(|reason| {
                LogWeaveError::Config(format!("external_handlers[{}]: {}", index, reason))
            })?;
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    #[default]
    Json,
}

/// Line sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    #[default]
    Stdout,
    Stderr,
    File,
    /// Only ship through external handlers
    None,
}

/// Output target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub target: OutputTarget,
    /// Base path for `file`; a date is inserted before the extension
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            target: OutputTarget::Stdout,
            path: "logs/logweave.log".to_string(),
        }
    }
}

/// What happens to a sensitive value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    /// Keep first and last character, mask the rest
    #[default]
    Mask,
    /// Replace with a fixed sentinel
    Remove,
}

/// Redaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub mode: RedactionMode,
    pub mask_char: char,
    /// Built-in key prefixes and value shapes (emails, card numbers, bearer tokens)
    pub smart_detection: bool,
    /// Extra key substrings, merged with `patterns`
    pub custom_keys: Vec<String>,
    /// Key substrings that trigger redaction
    pub patterns: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RedactionMode::Mask,
            mask_char: '*',
            smart_detection: true,
            custom_keys: Vec::new(),
            patterns: [
                "password", "passwd", "pwd", "token", "auth", "authorization", "api_key",
                "apikey", "api-key", "secret", "access_token", "refresh_token", "credit_card",
                "cc_number", "cvv", "cvc", "ssn", "nif", "iban", "pan", "phone", "mobile",
                "telephone", "email", "mail", "username", "cookie", "session",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// Payload shaping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub max_string_length: usize,
    pub max_array_depth: usize,
    pub max_file_size_kb: u64,
    pub summarize_uploads: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_string_length: 5000,
            max_array_depth: 10,
            max_file_size_kb: 1024,
            summarize_uploads: true,
        }
    }
}

/// Batch shipping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncShippingConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

impl Default for AsyncShippingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 100,
            batch_timeout_ms: 5000,
        }
    }
}

/// Basic auth credentials for an external handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// An external endpoint receiving JSON batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalHandlerConfig {
    /// Only `http` is supported
    pub driver: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Additional attempts after the first failure
    pub retry_count: u32,
    /// Fixed delay between attempts
    pub retry_backoff_ms: u64,
}

impl Default for ExternalHandlerConfig {
    fn default() -> Self {
        Self {
            driver: "http".to_string(),
            url: "http://localhost:9200".to_string(),
            auth: None,
            timeout: 10,
            retry_count: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ExternalHandlerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.driver != "http" {
            return Err(format!("unsupported driver '{}'", self.driver));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("url '{}' must be http:// or https://", self.url));
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Per-category toggles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionsConfig {
    pub startup: StartupSectionConfig,
    pub middleware: MiddlewareSectionConfig,
    pub database: DatabaseSectionConfig,
    pub cache: ToggleConfig,
    pub http_outbound: ToggleConfig,
    pub shutdown: ShutdownSectionConfig,
}

/// A section with only an on/off switch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSectionConfig {
    pub enabled: bool,
    pub capture_user_agent: bool,
    pub capture_query_string: bool,
}

impl Default for StartupSectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_user_agent: true,
            capture_query_string: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareSectionConfig {
    pub enabled: bool,
    /// When non-empty, only these middleware names are logged
    pub whitelist: Vec<String>,
    /// Middleware names never logged
    pub blacklist: Vec<String>,
}

impl Default for MiddlewareSectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl MiddlewareSectionConfig {
    pub fn allows(&self, name: &str) -> bool {
        if self.blacklist.iter().any(|b| b == name) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|w| w == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSectionConfig {
    pub enabled: bool,
    /// Include the top slow query samples (SQL may contain user data)
    pub capture_bindings: bool,
    pub slow_query_threshold_ms: f64,
}

impl Default for DatabaseSectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_bindings: false,
            slow_query_threshold_ms: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSectionConfig {
    pub enabled: bool,
    pub capture_memory_peak: bool,
    pub capture_loaded_units: bool,
    pub capture_subsystem_status: bool,
}

impl Default for ShutdownSectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_memory_peak: true,
            capture_loaded_units: true,
            capture_subsystem_status: false,
        }
    }
}

/// Model event to query correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelQueryConfig {
    pub enabled: bool,
    pub level: String,
    pub include_bindings: bool,
    /// Queries slower than this are logged as warnings
    pub slow_query_threshold_ms: f64,
}

impl Default for ModelQueryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            include_bindings: true,
            slow_query_threshold_ms: 100.0,
        }
    }
}

/// Console and queued-job units of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NonHttpContextConfig {
    pub enabled: bool,
    /// Prefix trace ids with `cli_` / `job_`
    pub prefix_trace_id: bool,
}

impl Default for NonHttpContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix_trace_id: true,
        }
    }
}
