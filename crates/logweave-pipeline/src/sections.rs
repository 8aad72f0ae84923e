//! Inputs for the logger's semantic section wrappers.

use std::collections::BTreeMap;

/// What is known about a request when it starts
#[derive(Debug, Clone, Default)]
pub struct StartupInfo {
    pub method: String,
    pub path: String,
    pub full_url: String,
    pub client_ip: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub query_string: Option<String>,
    /// Size of the request body in bytes
    pub request_payload_size: u64,
}

/// One slow statement, reported only when bindings capture is on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlowQuery {
    pub sql: String,
    pub duration_ms: f64,
}

/// Aggregated database activity for a unit
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub query_count: u64,
    pub total_query_ms: f64,
    pub slowest_query_ms: f64,
    pub slow_queries: Vec<SlowQuery>,
}

impl DatabaseStats {
    /// Fold one executed statement into the totals
    pub fn record(&mut self, sql: &str, duration_ms: f64, slow_threshold_ms: f64) {
        self.query_count += 1;
        self.total_query_ms += duration_ms;
        if duration_ms > self.slowest_query_ms {
            self.slowest_query_ms = duration_ms;
        }
        if duration_ms >= slow_threshold_ms {
            self.slow_queries.push(SlowQuery {
                sql: sql.to_string(),
                duration_ms,
            });
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub duration_ms: f64,
}

/// What is known about a unit when it ends
#[derive(Debug, Clone, Default)]
pub struct ShutdownInfo {
    pub request_ms: f64,
    pub response_status: u16,
    pub response_bytes: u64,
    pub memory_peak_mb: Option<f64>,
    pub loaded_units_count: Option<usize>,
    /// Named subsystem flags, e.g. `{"cache": true}`
    pub subsystem_status: BTreeMap<String, bool>,
    pub queue_jobs_dispatched: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_stats_record() {
        let mut stats = DatabaseStats::default();
        stats.record("select 1", 5.0, 100.0);
        stats.record("select * from big", 250.0, 100.0);
        stats.record("select 2", 100.0, 100.0);

        assert_eq!(stats.query_count, 3);
        assert_eq!(stats.total_query_ms, 355.0);
        assert_eq!(stats.slowest_query_ms, 250.0);
        assert_eq!(stats.slow_queries.len(), 2);
        assert_eq!(stats.slow_queries[0].sql, "select * from big");
    }
}
