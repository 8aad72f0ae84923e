//! Batched delivery of entries to external sinks.
//!
//! Entries accumulate in a buffer. After each append the shipper checks the
//! size and age triggers; when one fires the buffer is drained and the batch is
//! handed, still under the buffer lock, to one background task per sink. Each
//! sink sees batches in buffer order and a slow sink only delays itself. The
//! caller never waits on the network.

use async_trait::async_trait;
use logweave_core::config::{AsyncShippingConfig, AuthConfig, ExternalHandlerConfig};
use logweave_core::{LogEntry, OutputError};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Fixed-backoff retry settings for one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first failure
    pub retry_count: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// A destination that accepts whole batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, batch: &[LogEntry]) -> Result<(), OutputError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// POSTs each batch as a JSON array
pub struct HttpSink {
    url: String,
    client: Client,
    auth: Option<AuthConfig>,
    retry: RetryPolicy,
}

impl HttpSink {
    pub fn new(config: &ExternalHandlerConfig) -> Result<Self, OutputError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| OutputError::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            url = %config.url,
            timeout_secs = config.timeout,
            retry_count = config.retry_count,
            "HTTP sink initialized"
        );

        Ok(Self {
            url: config.url.clone(),
            client,
            auth: config.auth.clone(),
            retry: RetryPolicy {
                retry_count: config.retry_count,
                backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        })
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    fn name(&self) -> &str {
        &self.url
    }

    async fn send(&self, batch: &[LogEntry]) -> Result<(), OutputError> {
        let mut request = self.client.post(&self.url).json(batch);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| OutputError::Network(format!("Failed to ship batch: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OutputError::Network(format!(
                "Sink returned error {}: {}",
                status, body
            )));
        }

        debug!(url = %self.url, entries = batch.len(), "Shipped batch");
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

/// Buffers entries and ships them in batches
pub struct BatchShipper {
    batch_size: usize,
    batch_timeout: Duration,
    buffer: Mutex<Vec<LogEntry>>,
    last_flush: Mutex<Instant>,
    senders: Mutex<Option<Vec<mpsc::UnboundedSender<Arc<Vec<LogEntry>>>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchShipper {
    /// Start the shipper and its delivery task. Requires a tokio runtime.
    pub fn new(
        config: &AsyncShippingConfig,
        sinks: Vec<Arc<dyn BatchSink>>,
    ) -> Result<Self, OutputError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            OutputError::SinkUnavailable(format!("Batch shipping needs a tokio runtime: {}", e))
        })?;

        let mut senders = Vec::with_capacity(sinks.len());
        let mut workers = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let (sender, receiver) = mpsc::unbounded_channel();
            workers.push(runtime.spawn(deliver_batches(receiver, sink)));
            senders.push(sender);
        }

        info!(
            sinks = senders.len(),
            batch_size = config.batch_size,
            batch_timeout_ms = config.batch_timeout_ms,
            "Batch shipper started"
        );

        Ok(Self {
            batch_size: config.batch_size.max(1),
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            senders: Mutex::new(Some(senders)),
            workers: Mutex::new(workers),
        })
    }

    /// Buffer an entry. Returns true if this append triggered a flush.
    pub fn push(&self, entry: LogEntry) -> bool {
        let mut buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.push(entry);

        let size_reached = buffer.len() >= self.batch_size;
        let timed_out = self.since_last_flush() >= self.batch_timeout;
        if !(size_reached || timed_out) {
            return false;
        }

        // Dispatch before releasing the buffer so batches queue in order
        self.dispatch(std::mem::take(&mut *buffer));
        true
    }

    /// Ship whatever is buffered. Returns the number of entries handed off.
    pub fn flush(&self) -> usize {
        let mut buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = buffer.len();
        if count > 0 {
            self.dispatch(std::mem::take(&mut *buffer));
        }
        count
    }

    /// Flush, close the channel and wait for in-flight deliveries
    pub async fn shutdown(&self) {
        let flushed = self.flush();

        if let Ok(mut senders) = self.senders.lock() {
            senders.take();
        }

        let workers = self
            .workers
            .lock()
            .map(|mut workers| std::mem::take(&mut *workers))
            .unwrap_or_default();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Batch delivery task ended abnormally");
            }
        }

        info!(flushed, "Batch shipper stopped");
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn since_last_flush(&self) -> Duration {
        self.last_flush
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    fn dispatch(&self, batch: Vec<LogEntry>) {
        if let Ok(mut last) = self.last_flush.lock() {
            *last = Instant::now();
        }

        let entries = batch.len();
        let batch = Arc::new(batch);
        let sent = match self.senders.lock() {
            Ok(senders) => match senders.as_ref() {
                Some(senders) => senders
                    .iter()
                    .fold(true, |ok, sender| sender.send(Arc::clone(&batch)).is_ok() && ok),
                None => false,
            },
            Err(_) => false,
        };

        if sent {
            debug!(entries, "Batch queued for delivery");
        } else {
            warn!(entries, "Batch shipper is stopped, dropping batch");
        }
    }
}

impl Drop for BatchShipper {
    fn drop(&mut self) {
        let count = self.buffered_count();
        if count > 0 {
            warn!(entries = count, "Batch shipper dropped with buffered entries");
        }
    }
}

async fn deliver_batches(
    mut receiver: mpsc::UnboundedReceiver<Arc<Vec<LogEntry>>>,
    sink: Arc<dyn BatchSink>,
) {
    while let Some(batch) = receiver.recv().await {
        if let Err(e) = deliver(sink.as_ref(), &batch).await {
            warn!(error = %e, entries = batch.len(), "Dropping batch");
        }
    }
    debug!(sink = sink.name(), "Batch delivery task finished");
}

/// Send one batch to one sink, retrying with a fixed backoff
pub async fn deliver(sink: &dyn BatchSink, batch: &[LogEntry]) -> Result<(), OutputError> {
    let policy = sink.retry_policy();
    let attempts = policy.total_attempts();
    let mut attempt = 1;

    loop {
        match sink.send(batch).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                debug!(sink = sink.name(), attempt, error = %e, "Delivery failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(OutputError::Delivery {
                    sink: sink.name().to_string(),
                    attempts,
                    message: e.to_string(),
                })
            }
        }
    }
}
