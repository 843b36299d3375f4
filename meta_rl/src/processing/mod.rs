//! Turning raw paths into algorithm-ready batches.

pub mod advantages;
pub mod baseline;
pub mod sample_processor;

pub use advantages::{compute_gae, discount_cumsum, normalize_advantages, shift_advantages_to_positive};
pub use baseline::{Baseline, LinearFeatureBaseline, ZeroBaseline};
pub use sample_processor::{MetaSampleProcessor, ProcessorConfig};

use crate::core::{OffPolicyBatch, PathsPerTask, ProcessedBatch};
use crate::metrics::KvAccumulator;

/// How much a processing call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Return statistics and auxiliary counts
    All,
    /// Average return only
    Reward,
    None,
}

/// Sample processing consumed by the trainer.
pub trait SampleProcessor {
    type Baseline: Baseline;

    /// Process one meta-batch of paths and, when given, an off-policy batch.
    ///
    /// The second element is `Some` exactly when `off_sample` is `Some`; an
    /// empty off-policy batch is processed into an empty batch.
    fn process_samples(
        &mut self,
        off_sample: Option<&OffPolicyBatch>,
        paths: &PathsPerTask,
        log: LogMode,
        log_prefix: &str,
        kv: &mut KvAccumulator,
    ) -> anyhow::Result<(ProcessedBatch, Option<ProcessedBatch>)>;

    fn baseline(&self) -> &Self::Baseline;
}
