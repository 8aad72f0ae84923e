//! Per-unit sequence numbering.
//!
//! Each unit of work gets a contiguous run `0000000001, 0000000002, ...`.
//! The counter value itself lives in a [`CounterStore`] keyed by unit id, so a
//! unit that spans processes (e.g. a session resumed by a worker) can share
//! one run by attaching to the same id.

use crate::error::{LogWeaveError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Width of the zero-padded sequence string
pub const SEQUENCE_WIDTH: usize = 10;

/// Render a sequence number as a fixed-width decimal string
pub fn format_sequence(value: u64) -> String {
    format!("{:0width$}", value, width = SEQUENCE_WIDTH)
}

/// Storage for per-unit counters.
///
/// Implementations must make `increment` atomic per unit: two callers on the
/// same unit never observe the same value.
pub trait CounterStore: Send + Sync {
    /// Set the unit's counter back to 0
    fn reset(&self, unit: &str) -> Result<()>;

    /// Increment the unit's counter and return the new value
    fn increment(&self, unit: &str) -> Result<u64>;

    /// Forget the unit's counter once its lifetime is over
    fn release(&self, unit: &str) -> Result<()>;
}

/// In-process counters, the default store
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units currently tracked
    pub fn len(&self) -> usize {
        self.counters.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for MemoryCounterStore {
    fn reset(&self, unit: &str) -> Result<()> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        counters.insert(unit.to_string(), 0);
        Ok(())
    }

    fn increment(&self, unit: &str) -> Result<u64> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        let counter = counters.entry(unit.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn release(&self, unit: &str) -> Result<()> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        counters.remove(unit);
        Ok(())
    }
}


/// One counter file per unit under a directory.
///
/// Writes go to a temporary file that is renamed over the counter, so readers
/// never see a torn value. The in-process mutex serializes increments; it
/// does not coordinate with other processes.
#[derive(Debug)]
pub struct FileCounterStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCounterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Hex of the unit's bytes, so distinct units never share a file
    fn path_for(&self, unit: &str) -> PathBuf {
        let name: String = unit.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.seq", name))
    }

    fn read(&self, unit: &str) -> Result<u64> {
        match fs::read_to_string(self.path_for(unit)) {
            Ok(content) => content.trim().parse().map_err(|e| {
                LogWeaveError::Sequence(format!("corrupt counter for '{}': {}", unit, e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, unit: &str, value: u64) -> Result<()> {
        let path = self.path_for(unit);
        let tmp = path.with_extension("seq.tmp");
        fs::write(&tmp, value.to_string())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl CounterStore for FileCounterStore {
    fn reset(&self, unit: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        self.write(unit, 0)
    }

    fn increment(&self, unit: &str) -> Result<u64> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        let next = self.read(unit)? + 1;
        self.write(unit, next)?;
        Ok(next)
    }

    fn release(&self, unit: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LogWeaveError::Sequence("counter lock poisoned".to_string()))?;
        match fs::remove_file(self.path_for(unit)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Produces the sequence strings for one unit of work.
///
/// A counter that started its unit's run (through `reset` or `rebind`) owns
/// it and releases it from the store when rebound or dropped. A counter that
/// only attached to an existing run leaves it in place.
pub struct SequenceCounter {
    store: Arc<dyn CounterStore>,
    unit: String,
    last: u64,
    owned: bool,
}

impl SequenceCounter {
    /// A counter backed by its own in-memory store
    pub fn new(unit: impl Into<String>) -> Self {
        Self::with_store(Arc::new(MemoryCounterStore::new()), unit)
    }

    /// Attach to the unit's run in the store without resetting it
    pub fn with_store(store: Arc<dyn CounterStore>, unit: impl Into<String>) -> Self {
        Self {
            store,
            unit: unit.into(),
            last: 0,
            owned: false,
        }
    }

    /// Point the counter at another unit and start it from 0
    pub fn rebind(&mut self, unit: impl Into<String>) {
        self.release();
        self.unit = unit.into();
        self.reset();
    }

    /// Point the counter at another unit's existing run
    pub fn attach(&mut self, unit: impl Into<String>) {
        self.release();
        self.unit = unit.into();
        self.last = 0;
    }

    pub fn reset(&mut self) {
        if let Err(e) = self.store.reset(&self.unit) {
            warn!(unit = %self.unit, error = %e, "Failed to reset sequence store");
        }
        self.last = 0;
        self.owned = true;
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.owned) {
            return;
        }
        if let Err(e) = self.store.release(&self.unit) {
            warn!(unit = %self.unit, error = %e, "Failed to release sequence store entry");
        }
    }

    /// Advance and return the next zero-padded sequence string.
    ///
    /// If the store fails, numbering continues from the last value this
    /// counter handed out.
    pub fn next(&mut self) -> String {
        let value = match self.store.increment(&self.unit) {
            Ok(value) => value,
            Err(e) => {
                warn!(unit = %self.unit, error = %e, "Sequence store unavailable, continuing in memory");
                self.last + 1
            }
        };
        self.last = value;
        format_sequence(value)
    }

    /// The last value handed out (0 before the first call)
    pub fn current(&self) -> u64 {
        self.last
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl Drop for SequenceCounter {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SequenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceCounter")
            .field("unit", &self.unit)
            .field("last", &self.last)
            .finish()
    }
}
