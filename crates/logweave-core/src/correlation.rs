//! Correlation state for one unit of work.
//!
//! A [`CorrelationContext`] is owned by exactly one unit (request, console
//! invocation, queued job). It is never shared between units, so trace ids,
//! span ids and sequence numbers cannot leak across concurrent work.

use crate::log_entry::CorrelationSnapshot;
use crate::sequence::{CounterStore, MemoryCounterStore, SequenceCounter};
use chrono::{DateTime, FixedOffset, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Marks a trace id issued before a durable identity is known
pub const PROVISIONAL_PREFIX: &str = "tmp/";

/// A trace id and whether it is final
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceId {
    Provisional(String),
    Permanent(String),
}

impl TraceId {
    /// Classify a raw id by its prefix
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(PROVISIONAL_PREFIX) {
            TraceId::Provisional(raw.to_string())
        } else {
            TraceId::Permanent(raw.to_string())
        }
    }

    pub fn mint_provisional() -> Self {
        TraceId::Provisional(format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4()))
    }

    pub fn mint_permanent() -> Self {
        TraceId::Permanent(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TraceId::Provisional(id) | TraceId::Permanent(id) => id,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, TraceId::Provisional(_))
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of work a non-HTTP unit represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Console,
    Job,
}

impl UnitKind {
    fn method(&self) -> &'static str {
        match self {
            UnitKind::Console => "CLI",
            UnitKind::Job => "JOB",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UnitKind::Console => "cli",
            UnitKind::Job => "job",
        }
    }
}

/// Trace identity, request metadata, span ids and sequence for one unit
#[derive(Debug)]
pub struct CorrelationContext {
    trace_id: TraceId,
    replaced_provisional: Option<String>,
    method: String,
    path: String,
    client_ip: String,
    started_at: DateTime<FixedOffset>,
    started: Instant,
    span_ids: HashMap<String, String>,
    sequence: SequenceCounter,
    pending_boundary: bool,
}

impl CorrelationContext {
    /// A fresh context with a newly minted provisional trace id
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryCounterStore::new()))
    }

    /// A fresh context whose sequence lives in the given store.
    ///
    /// The sequence is keyed by a unit id minted for each lifetime, never by
    /// the trace id, so units that share an inbound trace id keep separate runs.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        let trace_id = TraceId::mint_provisional();
        let mut sequence = SequenceCounter::with_store(store, Uuid::new_v4().to_string());
        sequence.reset();
        Self {
            trace_id,
            replaced_provisional: None,
            method: "UNKNOWN".to_string(),
            path: "/".to_string(),
            client_ip: "UNKNOWN".to_string(),
            started_at: Local::now().fixed_offset(),
            started: Instant::now(),
            span_ids: HashMap::new(),
            sequence,
            pending_boundary: true,
        }
    }

    /// Start a new lifetime.
    ///
    /// A supplied id is adopted as-is: permanent unless it carries the
    /// provisional prefix. Without one a permanent UUID-v4 is minted. Span ids,
    /// the sequence and the start time are reset.
    pub fn initialize(
        &mut self,
        method: &str,
        path: &str,
        client_ip: &str,
        trace_hint: Option<&str>,
    ) {
        self.trace_id = match trace_hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => TraceId::parse(hint),
            None => TraceId::mint_permanent(),
        };
        self.replaced_provisional = None;
        self.pending_boundary = false;
        self.method = method.to_string();
        self.path = path.to_string();
        self.client_ip = client_ip.to_string();
        self.started_at = Local::now().fixed_offset();
        self.started = Instant::now();
        self.span_ids.clear();
        self.sequence.rebind(Uuid::new_v4().to_string());

        debug!(
            trace_id = %self.trace_id,
            provisional = self.trace_id.is_provisional(),
            method,
            path,
            "Correlation context initialized"
        );
    }

    /// Start a console or job lifetime with a kind-prefixed trace id
    pub fn initialize_non_http(&mut self, kind: UnitKind, description: &str, prefix_trace_id: bool) {
        let id = Uuid::new_v4().to_string();
        let trace_id = if prefix_trace_id {
            format!("{}_{}", kind.prefix(), id)
        } else {
            id
        };
        self.initialize(kind.method(), description, "127.0.0.1", Some(&trace_id));
    }

    /// Replace a provisional id with a permanent one.
    ///
    /// Returns true when the transition happened. Already-permanent contexts
    /// and provisional-looking targets are left untouched. Span ids and the
    /// sequence position carry over.
    pub fn upgrade(&mut self, permanent_id: &str) -> bool {
        if !self.trace_id.is_provisional() || permanent_id.starts_with(PROVISIONAL_PREFIX) {
            return false;
        }
        let previous = std::mem::replace(
            &mut self.trace_id,
            TraceId::Permanent(permanent_id.to_string()),
        );
        debug!(from = %previous, to = permanent_id, "Trace id upgraded");
        self.replaced_provisional = Some(previous.as_str().to_string());
        self.pending_boundary = false;
        true
    }

    pub fn trace(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn trace_id(&self) -> &str {
        self.trace_id.as_str()
    }

    /// The provisional id replaced by the last upgrade, if any
    pub fn replaced_provisional(&self) -> Option<&str> {
        self.replaced_provisional.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn started_at(&self) -> DateTime<FixedOffset> {
        self.started_at
    }

    /// The span id for a category, minted on first use
    pub fn get_or_create_span_id(&mut self, category: &str) -> String {
        self.span_ids
            .entry(category.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Key of this lifetime's sequence run in the counter store
    pub fn unit_id(&self) -> &str {
        self.sequence.unit()
    }

    /// Continue another lifetime's sequence run, e.g. a job resuming the run
    /// of the request that queued it. Both must use the same counter store.
    pub fn join_unit(&mut self, unit_id: &str) {
        self.sequence.attach(unit_id);
    }

    pub fn next_sequence(&mut self) -> String {
        self.sequence.next()
    }

    pub fn sequence_position(&self) -> u64 {
        self.sequence.current()
    }

    /// Milliseconds since the lifetime started
    pub fn duration_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// True once after a provisional id was minted; used to separate units
    /// visually in text output
    pub fn take_boundary(&mut self) -> bool {
        std::mem::take(&mut self.pending_boundary)
    }

    pub fn snapshot(&self) -> CorrelationSnapshot {
        CorrelationSnapshot {
            trace_id: self.trace_id().to_string(),
            method: self.method.clone(),
            path: self.path.clone(),
            client_ip: self.client_ip.clone(),
            request_duration_ms: self.duration_ms(),
        }
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}
