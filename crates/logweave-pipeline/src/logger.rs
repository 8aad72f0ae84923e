use crate::pipeline::LogPipeline;
use crate::sections::{CacheStats, DatabaseStats, ShutdownInfo, StartupInfo};
use logweave_core::{CorrelationContext, Field, Fields, LogEntry, LogLevel, UnitKind};
use logweave_modules::{ModelQuery, QueryCorrelator, QueryExecuted};
use std::sync::Arc;
use tracing::{debug, warn};

/// How many slow statements a database entry carries
const MAX_SLOW_QUERY_SAMPLES: usize = 5;

fn fields<const N: usize>(pairs: [(&str, Field); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Builds and emits entries for one unit of work.
///
/// Owns the unit's [`CorrelationContext`]; nothing here is shared between
/// units. Logging never fails from the caller's point of view: problems are
/// reported as diagnostics and the entry is dropped.
pub struct StructuredLogger {
    pipeline: Arc<LogPipeline>,
    context: CorrelationContext,
    queries: QueryCorrelator,
    database: DatabaseStats,
}

impl StructuredLogger {
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        let context = CorrelationContext::with_store(pipeline.counter_store());
        Self {
            pipeline,
            context,
            queries: QueryCorrelator::new(),
            database: DatabaseStats::default(),
        }
    }

    pub fn context(&self) -> &CorrelationContext {
        &self.context
    }

    pub fn trace_id(&self) -> &str {
        self.context.trace_id()
    }

    /// Start an HTTP unit. `trace_hint` is the value of the configured trace
    /// header, if the caller sent one.
    pub fn initialize(&mut self, method: &str, path: &str, client_ip: &str, trace_hint: Option<&str>) {
        self.context.initialize(method, path, client_ip, trace_hint);
        self.database = DatabaseStats::default();
    }

    /// Start an HTTP unit, taking the trace hint from the configured
    /// `trace_id_header` (matched case-insensitively)
    pub fn initialize_from_headers<'a, I>(
        &mut self,
        method: &str,
        path: &str,
        client_ip: &str,
        headers: I,
    ) where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let hint = self.pipeline.trace_hint(headers);
        self.initialize(method, path, client_ip, hint);
    }

    /// Start a console command or queued job unit
    pub fn initialize_non_http(&mut self, kind: UnitKind, description: &str) {
        let settings = &self.pipeline.config().non_http_context;
        if !settings.enabled {
            debug!(description, "Non-HTTP context disabled, keeping current trace");
            return;
        }
        let prefix = settings.prefix_trace_id;
        self.context.initialize_non_http(kind, description, prefix);
        self.database = DatabaseStats::default();
    }

    /// Swap the provisional trace id for a permanent one and record where it
    /// came from. Returns the announcing entry, or `None` if nothing changed.
    pub fn identify(&mut self, permanent_id: &str) -> Option<LogEntry> {
        if !self.context.upgrade(permanent_id) {
            return None;
        }

        let previous = self.context.replaced_provisional().unwrap_or_default().to_string();
        self.log(
            LogLevel::Info,
            "TRACE",
            format!("Trace identified from {}", previous),
            fields([("previous_trace_id", Field::from(previous.clone()))]),
            Fields::new(),
        )
    }

    /// Build, process and write one entry.
    ///
    /// Returns `None` without side effects when logging is disabled, the level
    /// is below the minimum, or the entry has no message, context or metrics.
    pub fn log(
        &mut self,
        level: LogLevel,
        category: &str,
        message: impl Into<String>,
        context: Fields,
        metrics: Fields,
    ) -> Option<LogEntry> {
        if !self.pipeline.is_enabled() || level < self.pipeline.min_level() {
            return None;
        }

        let message = message.into();
        if message.is_empty() && context.is_empty() && metrics.is_empty() {
            return None;
        }

        if self.context.take_boundary() {
            self.pipeline.write_separator();
        }

        let span_key = category.trim_start_matches('[').trim_end_matches(']');
        let span_id = self.context.get_or_create_span_id(span_key);
        let req_seq = self.context.next_sequence();

        let entry = LogEntry::new(level, category, message)
            .with_trace(self.context.trace_id(), req_seq, span_id)
            .with_context(context)
            .with_metrics(metrics)
            .with_correlation(self.context.snapshot());

        match self.pipeline.emit(entry) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(category, error = %e, "Failed to emit log entry");
                None
            }
        }
    }

    pub fn info(&mut self, category: &str, message: impl Into<String>, context: Fields) -> Option<LogEntry> {
        self.log(LogLevel::Info, category, message, context, Fields::new())
    }

    pub fn debug(&mut self, category: &str, message: impl Into<String>, context: Fields) -> Option<LogEntry> {
        self.log(LogLevel::Debug, category, message, context, Fields::new())
    }

    pub fn warning(&mut self, category: &str, message: impl Into<String>, context: Fields) -> Option<LogEntry> {
        self.log(LogLevel::Warning, category, message, context, Fields::new())
    }

    pub fn error(&mut self, category: &str, message: impl Into<String>, context: Fields) -> Option<LogEntry> {
        self.log(LogLevel::Error, category, message, context, Fields::new())
    }

    /// Two entries: the bare URL, then the request details as metrics
    pub fn log_startup(&mut self, info: &StartupInfo) -> Option<LogEntry> {
        let settings = self.pipeline.config().sections.startup.clone();
        if !settings.enabled {
            return None;
        }

        self.log(
            LogLevel::Info,
            "STARTUP",
            format!("URL: {}", info.full_url),
            Fields::new(),
            Fields::new(),
        );

        let mut metrics = fields([
            ("method", Field::from(info.method.as_str())),
            ("path", Field::from(info.path.as_str())),
            ("full_url", Field::from(info.full_url.as_str())),
            ("ip", Field::from(info.client_ip.as_str())),
            ("user_id", Field::from(info.user_id.clone())),
            ("tenant_id", Field::from(info.tenant_id.clone())),
            ("session_id", Field::from(info.session_id.clone())),
        ]);
        if settings.capture_user_agent {
            metrics.insert("user_agent".to_string(), Field::from(info.user_agent.clone()));
        }
        if settings.capture_query_string {
            metrics.insert("query_string".to_string(), Field::from(info.query_string.clone()));
        }
        metrics.insert(
            "request_payload_size".to_string(),
            Field::from(info.request_payload_size),
        );

        self.log(LogLevel::Info, "STARTUP", "Request initiated", Fields::new(), metrics)
    }

    pub fn log_middleware_start(&mut self, name: &str, request_id: &str) -> Option<LogEntry> {
        if !self.middleware_allowed(name) {
            return None;
        }

        self.log(
            LogLevel::Info,
            "MIDDLEWARE-START",
            format!("[MIDDLEWARE START] {}", name),
            fields([("request_id", Field::from(request_id))]),
            Fields::new(),
        )
    }

    pub fn log_middleware_end(
        &mut self,
        name: &str,
        duration_ms: f64,
        response_status: u16,
        extras: Fields,
    ) -> Option<LogEntry> {
        if !self.middleware_allowed(name) {
            return None;
        }

        let mut metrics = fields([
            ("duration_ms", Field::from(duration_ms)),
            ("response_status", Field::from(response_status)),
        ]);
        metrics.extend(extras);

        self.log(
            LogLevel::Info,
            "MIDDLEWARE-END",
            format!("[MIDDLEWARE END] {} - SUCCESS", name),
            Fields::new(),
            metrics,
        )
    }

    fn middleware_allowed(&self, name: &str) -> bool {
        let settings = &self.pipeline.config().sections.middleware;
        settings.enabled && settings.allows(name)
    }

    /// Database activity recorded through [`record_query`](Self::record_query)
    /// since the unit started
    pub fn database_stats(&self) -> &DatabaseStats {
        &self.database
    }

    /// Log the unit's own recorded database activity
    pub fn log_database_summary(&mut self) -> Option<LogEntry> {
        let stats = self.database.clone();
        self.log_database(&stats)
    }

    pub fn log_database(&mut self, stats: &DatabaseStats) -> Option<LogEntry> {
        let settings = self.pipeline.config().sections.database.clone();
        if !settings.enabled {
            return None;
        }

        let metrics = fields([
            ("query_count", Field::from(stats.query_count)),
            ("total_query_ms", Field::from(stats.total_query_ms)),
            ("slowest_query_ms", Field::from(stats.slowest_query_ms)),
            ("slow_queries_count", Field::from(stats.slow_queries.len())),
        ]);

        let mut context = Fields::new();
        if settings.capture_bindings && !stats.slow_queries.is_empty() {
            let samples = stats
                .slow_queries
                .iter()
                .take(MAX_SLOW_QUERY_SAMPLES)
                .map(|q| {
                    Field::Map(fields([
                        ("sql", Field::from(q.sql.as_str())),
                        ("duration_ms", Field::from(q.duration_ms)),
                    ]))
                })
                .collect::<Vec<_>>();
            context.insert("slow_queries".to_string(), Field::List(samples));
        }

        self.log(LogLevel::Info, "DATABASE", "Database statistics", context, metrics)
    }

    pub fn log_http_out(
        &mut self,
        method: &str,
        url: &str,
        status: u16,
        duration_ms: f64,
        extras: Fields,
    ) -> Option<LogEntry> {
        if !self.pipeline.config().sections.http_outbound.enabled {
            return None;
        }

        let mut metrics = fields([
            ("method", Field::from(method)),
            ("url", Field::from(url)),
            ("status", Field::from(status)),
            ("duration_ms", Field::from(duration_ms)),
        ]);
        metrics.extend(extras);

        self.log(
            LogLevel::Info,
            "HTTP-OUT",
            format!("HTTP {} {} - {}", method, url, status),
            Fields::new(),
            metrics,
        )
    }

    pub fn log_cache(&mut self, stats: &CacheStats) -> Option<LogEntry> {
        if !self.pipeline.config().sections.cache.enabled {
            return None;
        }

        let metrics = fields([
            ("hits", Field::from(stats.hits)),
            ("misses", Field::from(stats.misses)),
            ("sets", Field::from(stats.sets)),
            ("duration_ms", Field::from(stats.duration_ms)),
        ]);

        self.log(LogLevel::Info, "CACHE", "Cache statistics", Fields::new(), metrics)
    }

    pub fn log_shutdown(&mut self, info: &ShutdownInfo) -> Option<LogEntry> {
        let settings = self.pipeline.config().sections.shutdown.clone();
        if !settings.enabled {
            return None;
        }

        let mut metrics = fields([
            ("request_ms", Field::from(info.request_ms)),
            ("response_status", Field::from(info.response_status)),
            ("response_bytes", Field::from(info.response_bytes)),
        ]);

        if settings.capture_memory_peak {
            if let Some(peak) = info.memory_peak_mb {
                metrics.insert("memory_peak_mb".to_string(), Field::from(peak));
            }
        }
        if settings.capture_loaded_units {
            if let Some(count) = info.loaded_units_count {
                metrics.insert("loaded_units_count".to_string(), Field::from(count));
            }
        }
        if settings.capture_subsystem_status {
            for (name, up) in &info.subsystem_status {
                metrics.insert(format!("{}_enabled", name), Field::from(*up));
            }
        }
        if info.queue_jobs_dispatched > 0 {
            metrics.insert(
                "queue_jobs_dispatched".to_string(),
                Field::from(info.queue_jobs_dispatched),
            );
        }

        self.log(LogLevel::Info, "SHUTDOWN", "Request completed", Fields::new(), metrics)
    }

    /// Remember a model event so the next query can be attributed to it
    pub fn record_model_event(&mut self, model: &str, event: &str) {
        if self.pipeline.config().model_query.enabled {
            self.queries.record_model_event(model, event);
        }
    }

    /// Report an executed query. It always counts towards the unit's database
    /// stats; a model entry is emitted only when a recent model event is
    /// pending.
    pub fn record_query(&mut self, query: QueryExecuted) -> Option<LogEntry> {
        let slow_threshold_ms = self.pipeline.config().sections.database.slow_query_threshold_ms;
        self.database.record(&query.sql, query.duration_ms, slow_threshold_ms);

        if !self.pipeline.config().model_query.enabled {
            return None;
        }
        let model_query = self.queries.correlate(query)?;
        self.log_model_query(&model_query)
    }

    pub fn log_model_query(&mut self, query: &ModelQuery) -> Option<LogEntry> {
        let settings = self.pipeline.config().model_query.clone();
        if !settings.enabled {
            return None;
        }

        let level = if query.duration_ms > settings.slow_query_threshold_ms {
            LogLevel::Warning
        } else {
            settings.level.parse().unwrap_or(LogLevel::Debug)
        };

        let mut context = fields([("sql", Field::from(query.sql.as_str()))]);
        if settings.include_bindings {
            context.insert("bindings".to_string(), Field::List(query.bindings.clone()));
        }

        let metrics = fields([
            ("duration_ms", Field::from(query.duration_ms)),
            ("record_count", Field::from(&query.record_count)),
            ("connection", Field::from(query.connection.as_str())),
        ]);

        self.log(level, &query.section(), query.message(), context, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SlowQuery;
    use logweave_core::config::LogFormat;
    use logweave_core::{fields_from_json, Config, MemoryCounterStore, PROVISIONAL_PREFIX};
    use logweave_output::MemorySink;
    use serde_json::json;

    fn setup(config: Config) -> (StructuredLogger, MemorySink) {
        let sink = MemorySink::new();
        let pipeline = Arc::new(LogPipeline::new(config, Box::new(sink.clone())).unwrap());
        (pipeline.begin_unit(), sink)
    }

    fn shared_pipeline() -> (Arc<LogPipeline>, Arc<MemoryCounterStore>) {
        let store = Arc::new(MemoryCounterStore::new());
        let pipeline = LogPipeline::new(Config::default(), Box::new(MemorySink::new()))
            .unwrap()
            .with_counter_store(store.clone());
        (Arc::new(pipeline), store)
    }

    fn http_unit(config: Config) -> (StructuredLogger, MemorySink) {
        let (mut logger, sink) = setup(config);
        logger.initialize("GET", "/orders", "10.0.0.1", None);
        (logger, sink)
    }

    #[test]
    fn test_sequence_is_contiguous() {
        let (mut logger, _) = http_unit(Config::default());
        let seqs: Vec<String> = (0..5)
            .map(|i| logger.info("TEST", format!("entry {}", i), Fields::new()).unwrap().req_seq)
            .collect();
        assert_eq!(
            seqs,
            vec!["0000000001", "0000000002", "0000000003", "0000000004", "0000000005"]
        );
    }

    #[test]
    fn test_initialize_resets_sequence() {
        let (mut logger, _) = http_unit(Config::default());
        logger.info("TEST", "a", Fields::new());
        logger.info("TEST", "b", Fields::new());

        logger.initialize("POST", "/next", "10.0.0.2", None);
        let entry = logger.info("TEST", "c", Fields::new()).unwrap();
        assert_eq!(entry.req_seq, "0000000001");
    }

    #[test]
    fn test_span_per_category() {
        let (mut logger, _) = http_unit(Config::default());
        let a = logger.info("DATABASE", "one", Fields::new()).unwrap();
        let b = logger.info("DATABASE", "two", Fields::new()).unwrap();
        let c = logger.info("CACHE", "three", Fields::new()).unwrap();
        assert_eq!(a.span_id, b.span_id);
        assert_ne!(a.span_id, c.span_id);
    }

    #[test]
    fn test_disabled_and_below_level_have_no_side_effects() {
        let config = Config {
            enabled: false,
            ..Config::default()
        };
        let (mut logger, sink) = http_unit(config);
        assert!(logger.info("TEST", "hidden", Fields::new()).is_none());
        assert!(sink.lines().is_empty());

        let config = Config {
            level: "warning".to_string(),
            ..Config::default()
        };
        let (mut logger, sink) = http_unit(config);
        assert!(logger.info("TEST", "too quiet", Fields::new()).is_none());
        assert_eq!(logger.context().sequence_position(), 0);
        let entry = logger.error("TEST", "loud", Fields::new()).unwrap();
        assert_eq!(entry.req_seq, "0000000001");
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_blank_entry_suppressed() {
        let (mut logger, sink) = http_unit(Config::default());
        assert!(logger.info("TEST", "", Fields::new()).is_none());
        assert!(sink.lines().is_empty());
        assert_eq!(logger.context().sequence_position(), 0);
    }

    #[test]
    fn test_separator_before_first_provisional_entry() {
        let config = Config {
            format: LogFormat::Text,
            ..Config::default()
        };
        let (mut logger, sink) = setup(config);
        assert!(logger.trace_id().starts_with(PROVISIONAL_PREFIX));

        logger.info("TEST", "one", Fields::new());
        logger.info("TEST", "two", Fields::new());

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "");
        assert!(lines[1].contains("one"));
    }

    #[test]
    fn test_identify_upgrades_and_announces() {
        let (mut logger, _) = setup(Config::default());
        let provisional = logger.trace_id().to_string();
        logger.info("TEST", "before", Fields::new());

        let entry = logger.identify("user-42-trace").unwrap();
        assert_eq!(entry.trace_id, "user-42-trace");
        assert_eq!(entry.message, format!("Trace identified from {}", provisional));
        assert_eq!(entry.req_seq, "0000000002");

        assert!(logger.identify("another").is_none());
    }

    #[test]
    fn test_non_http_unit() {
        let (mut logger, _) = setup(Config::default());
        logger.initialize_non_http(UnitKind::Console, "reports:send");

        let entry = logger.info("TEST", "running", Fields::new()).unwrap();
        assert!(entry.trace_id.starts_with("cli_"));
        assert_eq!(entry.correlation.method, "CLI");
        assert_eq!(entry.correlation.path, "reports:send");
    }

    #[test]
    fn test_startup_section() {
        let mut config = Config::default();
        config.sections.startup.capture_user_agent = false;
        let (mut logger, sink) = http_unit(config);

        let info = StartupInfo {
            method: "GET".to_string(),
            path: "/orders".to_string(),
            full_url: "https://shop.test/orders?page=2".to_string(),
            client_ip: "10.0.0.1".to_string(),
            user_agent: Some("curl/8".to_string()),
            query_string: Some("page=2".to_string()),
            request_payload_size: 12,
            ..StartupInfo::default()
        };
        let entry = logger.log_startup(&info).unwrap();

        assert_eq!(sink.lines().len(), 2);
        assert_eq!(entry.message, "Request initiated");
        assert_eq!(entry.section, "[STARTUP]");
        assert!(!entry.metrics.contains_key("user_agent"));
        assert_eq!(entry.metrics["query_string"].as_str(), Some("page=2"));
        assert_eq!(entry.metrics["request_payload_size"], Field::UInt(12));
        assert_eq!(entry.metrics["user_id"], Field::Null);
    }

    #[test]
    fn test_middleware_filtering() {
        let mut config = Config::default();
        config.sections.middleware.blacklist = vec!["Throttle".to_string()];
        let (mut logger, _) = http_unit(config);

        assert!(logger.log_middleware_start("Throttle", "req-1").is_none());
        let start = logger.log_middleware_start("Auth", "req-1").unwrap();
        assert_eq!(start.message, "[MIDDLEWARE START] Auth");

        let end = logger
            .log_middleware_end("Auth", 3.5, 200, fields_from_json(json!({"cache_hit": true})))
            .unwrap();
        assert_eq!(end.message, "[MIDDLEWARE END] Auth - SUCCESS");
        assert_eq!(end.metrics["response_status"], Field::UInt(200));
        assert_eq!(end.metrics["cache_hit"], Field::Bool(true));
    }

    #[test]
    fn test_database_slow_queries_gated() {
        let stats = DatabaseStats {
            query_count: 7,
            total_query_ms: 900.0,
            slowest_query_ms: 300.0,
            slow_queries: (0..7)
                .map(|i| SlowQuery {
                    sql: format!("select {}", i),
                    duration_ms: 120.0,
                })
                .collect(),
        };

        let (mut logger, _) = http_unit(Config::default());
        let entry = logger.log_database(&stats).unwrap();
        assert!(entry.context.is_empty());
        assert_eq!(entry.metrics["slow_queries_count"], Field::UInt(7));

        let mut config = Config::default();
        config.sections.database.capture_bindings = true;
        let (mut logger, _) = http_unit(config);
        let entry = logger.log_database(&stats).unwrap();
        match &entry.context["slow_queries"] {
            Field::List(samples) => assert_eq!(samples.len(), MAX_SLOW_QUERY_SAMPLES),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_recorded_queries_use_configured_threshold() {
        let mut config = Config::default();
        config.sections.database.slow_query_threshold_ms = 50.0;
        let (mut logger, _) = http_unit(config);

        logger.record_query(QueryExecuted::new("select 1", vec![], 10.0));
        logger.record_query(QueryExecuted::new("select * from big", vec![], 60.0));

        let stats = logger.database_stats();
        assert_eq!(stats.query_count, 2);
        assert_eq!(stats.slow_queries.len(), 1);
        assert_eq!(stats.slow_queries[0].sql, "select * from big");

        let entry = logger.log_database_summary().unwrap();
        assert_eq!(entry.metrics["query_count"], Field::UInt(2));
        assert_eq!(entry.metrics["slow_queries_count"], Field::UInt(1));

        logger.initialize("GET", "/next", "10.0.0.1", None);
        assert_eq!(logger.database_stats().query_count, 0);
    }

    #[test]
    fn test_trace_hint_from_configured_header() {
        let mut config = Config::default();
        config.trace_id_header = "X-Request-Id".to_string();
        let (mut logger, _) = setup(config);

        logger.initialize_from_headers(
            "GET",
            "/orders",
            "10.0.0.1",
            [("accept", "*/*"), ("x-request-id", "upstream-9")],
        );
        assert_eq!(logger.trace_id(), "upstream-9");

        logger.initialize_from_headers("GET", "/orders", "10.0.0.1", [("X-Trace-Id", "ignored")]);
        assert_ne!(logger.trace_id(), "ignored");
        assert!(!logger.context().trace().is_provisional());
    }

    #[test]
    fn test_units_sharing_a_hint_keep_own_sequence() {
        let (pipeline, _) = shared_pipeline();
        let mut a = pipeline.begin_unit();
        let mut b = pipeline.begin_unit();

        a.initialize("GET", "/retry", "10.0.0.1", Some("upstream-1"));
        let first = a.info("TEST", "a1", Fields::new()).unwrap().req_seq;
        let second = a.info("TEST", "a2", Fields::new()).unwrap().req_seq;
        b.initialize("GET", "/retry", "10.0.0.2", Some("upstream-1"));
        let other = b.info("TEST", "b1", Fields::new()).unwrap().req_seq;
        let third = a.info("TEST", "a3", Fields::new()).unwrap().req_seq;

        assert_eq!(
            vec![first, second, third],
            vec!["0000000001", "0000000002", "0000000003"]
        );
        assert_eq!(other, "0000000001");
    }

    #[test]
    fn test_finished_units_release_counters() {
        let (pipeline, store) = shared_pipeline();
        for i in 0..10 {
            let mut logger = pipeline.begin_unit();
            logger.initialize("GET", &format!("/r/{}", i), "10.0.0.1", None);
            logger.info("TEST", "tick", Fields::new());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_http_out_and_cache() {
        let (mut logger, _) = http_unit(Config::default());
        let entry = logger
            .log_http_out("POST", "https://api.test/pay", 201, 88.0, Fields::new())
            .unwrap();
        assert_eq!(entry.message, "HTTP POST https://api.test/pay - 201");
        assert_eq!(entry.section, "[HTTP-OUT]");

        let entry = logger
            .log_cache(&CacheStats {
                hits: 4,
                misses: 1,
                sets: 1,
                duration_ms: 0.4,
            })
            .unwrap();
        assert_eq!(entry.metrics["hits"], Field::UInt(4));
    }

    #[test]
    fn test_section_toggles() {
        let mut config = Config::default();
        config.sections.cache.enabled = false;
        config.sections.http_outbound.enabled = false;
        let (mut logger, _) = http_unit(config);

        assert!(logger.log_cache(&CacheStats::default()).is_none());
        assert!(logger
            .log_http_out("GET", "https://x.test", 200, 1.0, Fields::new())
            .is_none());
    }

    #[test]
    fn test_shutdown_section() {
        let mut config = Config::default();
        config.sections.shutdown.capture_loaded_units = false;
        let (mut logger, _) = http_unit(config);

        let info = ShutdownInfo {
            request_ms: 41.0,
            response_status: 200,
            response_bytes: 512,
            memory_peak_mb: Some(18.5),
            loaded_units_count: Some(300),
            queue_jobs_dispatched: 0,
            ..ShutdownInfo::default()
        };
        let entry = logger.log_shutdown(&info).unwrap();

        assert_eq!(entry.message, "Request completed");
        assert_eq!(entry.metrics["memory_peak_mb"], Field::Float(18.5));
        assert!(!entry.metrics.contains_key("loaded_units_count"));
        assert!(!entry.metrics.contains_key("queue_jobs_dispatched"));
    }

    #[test]
    fn test_model_query_correlation() {
        let (mut logger, _) = http_unit(Config::default());

        logger.record_model_event("App\\Models\\Order", "created");
        let entry = logger
            .record_query(
                QueryExecuted::new(
                    "insert into orders (total) values (?)",
                    vec![Field::Float(9.5)],
                    2.0,
                )
                .on_connection("pg"),
            )
            .unwrap();

        assert_eq!(entry.section, "[MODEL/Order/insert]");
        assert_eq!(entry.level, LogLevel::Debug);
        assert_eq!(entry.context["sql"].as_str(), Some("insert into orders (total) values (9.5)"));
        assert_eq!(entry.metrics["connection"].as_str(), Some("pg"));

        assert!(logger
            .record_query(QueryExecuted::new("select 1", vec![], 1.0))
            .is_none());
    }

    #[test]
    fn test_slow_model_query_escalates() {
        let (mut logger, _) = http_unit(Config::default());
        logger.record_model_event("User", "retrieved");
        let entry = logger
            .record_query(QueryExecuted::new("select * from users", vec![], 250.0))
            .unwrap();
        assert_eq!(entry.level, LogLevel::Warning);
    }
}
