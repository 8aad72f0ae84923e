//! Line sinks for rendered entries.

use chrono::{Local, NaiveDate};
use logweave_core::config::{OutputConfig, OutputTarget};
use logweave_core::OutputError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Destination for rendered lines. One line per call, newline appended by the sink.
pub trait LineSink: Send {
    fn name(&self) -> &'static str;

    fn write_line(&mut self, line: &str) -> Result<(), OutputError>;

    fn flush(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Build the sink selected by the output configuration
pub fn open_sink(config: &OutputConfig) -> Result<Box<dyn LineSink>, OutputError> {
    let sink: Box<dyn LineSink> = match config.target {
        OutputTarget::Stdout => Box::new(StdoutSink),
        OutputTarget::Stderr => Box::new(StderrSink),
        OutputTarget::File => Box::new(FileSink::new(&config.path)?),
        OutputTarget::None => Box::new(NullSink),
    };
    debug!(sink = sink.name(), "Opened line sink");
    Ok(sink)
}

#[derive(Debug, Default)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", line).map_err(|e| OutputError::SinkUnavailable(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        io::stdout()
            .flush()
            .map_err(|e| OutputError::SinkUnavailable(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct StderrSink;

impl LineSink for StderrSink {
    fn name(&self) -> &'static str {
        "stderr"
    }

    fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", line).map_err(|e| OutputError::SinkUnavailable(e.to_string()))
    }
}

/// Discards everything; used when lines are only shipped externally
#[derive(Debug, Default)]
pub struct NullSink;

impl LineSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn write_line(&mut self, _line: &str) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Collects lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LineSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        self.lines
            .lock()
            .map_err(|_| OutputError::SinkUnavailable("memory sink poisoned".to_string()))?
            .push(line.to_string());
        Ok(())
    }
}

/// Appends to a dated file, `logs/app.log` becoming `logs/app-2024-05-01.log`.
/// A new file is opened when the local date changes.
pub struct FileSink {
    base_path: PathBuf,
    current_path: PathBuf,
    current_date: NaiveDate,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        let base_path = path.as_ref().to_path_buf();

        if let Some(parent) = base_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    OutputError::SinkUnavailable(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let today = Local::now().date_naive();
        let mut sink = Self {
            current_path: dated_path(&base_path, today),
            base_path,
            current_date: today,
            writer: None,
        };
        sink.open_file()?;
        Ok(sink)
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    fn open_file(&mut self) -> Result<(), OutputError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_path)
            .map_err(|e| {
                OutputError::SinkUnavailable(format!(
                    "Failed to open file {:?}: {}",
                    self.current_path, e
                ))
            })?;

        self.writer = Some(BufWriter::new(file));
        info!(path = %self.current_path.display(), "Opened log file for writing");
        Ok(())
    }

    fn roll_if_needed(&mut self, today: NaiveDate) -> Result<(), OutputError> {
        if today == self.current_date && self.writer.is_some() {
            return Ok(());
        }

        self.flush()?;
        self.current_date = today;
        self.current_path = dated_path(&self.base_path, today);
        self.open_file()
    }
}

impl LineSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn write_line(&mut self, line: &str) -> Result<(), OutputError> {
        self.roll_if_needed(Local::now().date_naive())?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| OutputError::SinkUnavailable("File not open".to_string()))?;

        append_line(writer, line)
            .map_err(|e| OutputError::SinkUnavailable(format!("Failed to write to file: {}", e)))
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| OutputError::SinkUnavailable(format!("Failed to flush file: {}", e)))?;
        }
        Ok(())
    }
}

fn append_line(writer: &mut BufWriter<File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn dated_path(base: &Path, date: NaiveDate) -> PathBuf {
    insert_date_into_path(base, &date.format("%Y-%m-%d").to_string())
}

fn insert_date_into_path(base: &Path, date: &str) -> PathBuf {
    match (base.file_stem(), base.extension()) {
        (Some(stem), Some(ext)) => base.with_file_name(format!(
            "{}-{}.{}",
            stem.to_string_lossy(),
            date,
            ext.to_string_lossy()
        )),
        (Some(stem), None) => base.with_file_name(format!("{}-{}", stem.to_string_lossy(), date)),
        _ => base.with_extension(date),
    }
}
