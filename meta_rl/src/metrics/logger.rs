//! Metric logging backends.
//!
//! Each backend receives one `KvRecord` per training iteration.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::record::KvRecord;

/// Logger trait for different logging backends.
pub trait MetricsLogger {
    /// Log one record.
    fn log(&mut self, record: &KvRecord);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger printing each record as a two-column table.
pub struct ConsoleLogger {
    key_width: usize,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self { key_width: 0 }
    }

    fn render(&mut self, record: &KvRecord) -> String {
        let width = record.keys().map(str::len).max().unwrap_or(0);
        self.key_width = self.key_width.max(width);
        let values: Vec<String> = record.iter().map(|(_, v)| v.to_string()).collect();
        let value_width = values.iter().map(String::len).max().unwrap_or(0);
        let rule = "-".repeat(self.key_width + value_width + 7);

        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        for ((key, _), value) in record.iter().zip(values.iter()) {
            out.push_str(&format!(
                "| {:<kw$} | {:>vw$} |\n",
                key,
                value,
                kw = self.key_width,
                vw = value_width
            ));
        }
        out.push_str(&rule);
        out
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, record: &KvRecord) {
        if record.is_empty() {
            return;
        }
        println!("{}", self.render(record));
    }

    fn flush(&mut self) {
        // stdout is line-buffered
    }
}

/// CSV file logger.
///
/// The header is taken from the first record. Keys that only show up later
/// are dropped from the file.
pub struct CSVLogger {
    writer: BufWriter<File>,
    header: Option<Vec<String>>,
}

impl CSVLogger {
    /// Create a new CSV logger at `path`, truncating any existing file.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            header: None,
        })
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, record: &KvRecord) {
        if record.is_empty() {
            return;
        }
        if self.header.is_none() {
            let header: Vec<String> = record.keys().map(str::to_owned).collect();
            let _ = writeln!(self.writer, "{}", header.join(","));
            self.header = Some(header);
        }
        if let Some(header) = &self.header {
            let row: Vec<String> = header
                .iter()
                .map(|k| record.get(k).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            let _ = writeln!(self.writer, "{}", row.join(","));
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, record: &KvRecord) {
        for logger in &mut self.loggers {
            logger.log(record);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Vec<KvRecord>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[KvRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<KvRecord> {
        self.records
    }
}

impl MetricsLogger for MemoryLogger {
    fn log(&mut self, record: &KvRecord) {
        self.records.push(record.clone());
    }

    fn flush(&mut self) {}
}
