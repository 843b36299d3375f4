//! Training metrics and logging.
//!
//! ## Records
//!
//! - [`KvAccumulator`]: per-iteration `logkv` / `dump` accumulation
//! - [`KvRecord`]: one flushed, ordered set of metrics
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: two-column table on stdout
//! - [`CSVLogger`]: CSV file logging for analysis
//! - [`MemoryLogger`]: keeps records in memory
//! - [`MultiLogger`]: combine multiple loggers
//!
//! Progress messages go through `tracing`; [`init_tracing`] installs a
//! formatting subscriber for binaries and tests.

pub mod logger;
pub mod record;

pub use logger::{CSVLogger, ConsoleLogger, MemoryLogger, MetricsLogger, MultiLogger};
pub use record::{KvAccumulator, KvRecord, MetricValue};

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
