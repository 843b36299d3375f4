//! Meta-batch sample processor.
//!
//! Per task: fit the baseline on that task's on-policy paths, compute
//! discounted returns and GAE advantages, flatten the paths into
//! [`TaskSamples`]. The off-policy paths of the same task are processed right
//! after with the same fitted baseline. Return statistics are aggregated over
//! all tasks of a batch.

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use super::advantages::{
    compute_gae, discount_cumsum, normalize_advantages, shift_advantages_to_positive,
};
use super::baseline::Baseline;
use super::{LogMode, SampleProcessor};
use crate::core::{BatchStats, OffPolicyBatch, Path, PathsPerTask, ProcessedBatch, TaskSamples};
use crate::metrics::KvAccumulator;
use crate::trainer::ConfigError;

/// Configuration for [`MetaSampleProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Discount factor
    pub discount: f32,
    /// GAE λ
    pub gae_lambda: f32,
    /// Normalize advantages per task
    pub normalize_adv: bool,
    /// Shift advantages to be positive (after normalization)
    pub positive_adv: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            gae_lambda: 1.0,
            normalize_adv: true,
            positive_adv: false,
        }
    }
}

impl ProcessorConfig {
    pub fn with_discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_gae_lambda(mut self, lambda: f32) -> Self {
        self.gae_lambda = lambda;
        self
    }

    pub fn with_normalize_adv(mut self, normalize: bool) -> Self {
        self.normalize_adv = normalize;
        self
    }

    pub fn with_positive_adv(mut self, positive: bool) -> Self {
        self.positive_adv = positive;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::OutOfRange {
                field: "discount",
                value: self.discount,
                min: 0.0,
                max: 1.0,
            });
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(ConfigError::OutOfRange {
                field: "gae_lambda",
                value: self.gae_lambda,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

/// Path returns gathered while processing one batch.
#[derive(Debug, Default)]
struct ReturnTally {
    undiscounted: Vec<f32>,
    discounted: Vec<f32>,
    n_timesteps: usize,
}

impl ReturnTally {
    fn stats(&self) -> BatchStats {
        let n = self.undiscounted.len();
        if n == 0 {
            return BatchStats {
                n_timesteps: self.n_timesteps,
                ..Default::default()
            };
        }
        let mean = self.undiscounted.iter().sum::<f32>() / n as f32;
        let variance = self.undiscounted.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n as f32;
        BatchStats {
            average_return: mean,
            std_return: variance.sqrt(),
            max_return: self.undiscounted.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            min_return: self.undiscounted.iter().copied().fold(f32::INFINITY, f32::min),
            average_discounted_return: self.discounted.iter().sum::<f32>() / n as f32,
            n_paths: n,
            n_timesteps: self.n_timesteps,
        }
    }
}

fn check_path(path: &Path) -> anyhow::Result<()> {
    let n = path.len();
    ensure!(
        path.observations.len() == n
            && path.actions.len() == n
            && path.next_observations.len() == n
            && path.dones.len() == n,
        "malformed path: {} rewards, {} observations, {} actions",
        n,
        path.observations.len(),
        path.actions.len()
    );
    Ok(())
}

/// Sample processor for meta-batches.
#[derive(Debug, Clone)]
pub struct MetaSampleProcessor<Bl> {
    baseline: Bl,
    config: ProcessorConfig,
}

impl<Bl: Baseline> MetaSampleProcessor<Bl> {
    pub fn new(baseline: Bl, config: ProcessorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { baseline, config })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Flatten `paths` of one task with the currently fitted baseline.
    fn task_samples(&self, paths: &[Path], tally: &mut ReturnTally) -> anyhow::Result<TaskSamples> {
        let mut samples = TaskSamples::default();
        for path in paths {
            check_path(path)?;
            let returns = discount_cumsum(&path.rewards, self.config.discount);
            let baselines = self.baseline.predict(path);
            ensure!(
                baselines.len() == path.len(),
                "baseline predicted {} values for a path of {} steps",
                baselines.len(),
                path.len()
            );
            let advantages = compute_gae(
                &path.rewards,
                &baselines,
                self.config.discount,
                self.config.gae_lambda,
            );

            tally.undiscounted.push(path.total_reward());
            tally.discounted.push(returns.first().copied().unwrap_or(0.0));
            tally.n_timesteps += path.len();

            samples.observations.extend_from_slice(&path.observations);
            samples.actions.extend_from_slice(&path.actions);
            samples.rewards.extend_from_slice(&path.rewards);
            samples.next_observations.extend_from_slice(&path.next_observations);
            samples.dones.extend_from_slice(&path.dones);
            samples.returns.extend(returns);
            samples.advantages.extend(advantages);
            samples.baselines.extend(baselines);
        }

        if self.config.normalize_adv {
            normalize_advantages(&mut samples.advantages);
        }
        if self.config.positive_adv {
            shift_advantages_to_positive(&mut samples.advantages);
        }
        Ok(samples)
    }

    fn log_stats(kv: &mut KvAccumulator, log: LogMode, prefix: &str, stats: &BatchStats) {
        match log {
            LogMode::None => {}
            LogMode::Reward => {
                kv.logkv(format!("{}AverageReturn", prefix), stats.average_return);
            }
            LogMode::All => {
                kv.logkv(format!("{}AverageDiscountedReturn", prefix), stats.average_discounted_return);
                kv.logkv(format!("{}AverageReturn", prefix), stats.average_return);
                kv.logkv(format!("{}NumTrajs", prefix), stats.n_paths);
                kv.logkv(format!("{}StdReturn", prefix), stats.std_return);
                kv.logkv(format!("{}MaxReturn", prefix), stats.max_return);
                kv.logkv(format!("{}MinReturn", prefix), stats.min_return);
            }
        }
    }
}

impl<Bl: Baseline> SampleProcessor for MetaSampleProcessor<Bl> {
    type Baseline = Bl;

    fn process_samples(
        &mut self,
        off_sample: Option<&OffPolicyBatch>,
        paths: &PathsPerTask,
        log: LogMode,
        log_prefix: &str,
        kv: &mut KvAccumulator,
    ) -> anyhow::Result<(ProcessedBatch, Option<ProcessedBatch>)> {
        let mut on = ProcessedBatch::default();
        let mut off = off_sample.map(|_| ProcessedBatch::default());
        let mut on_tally = ReturnTally::default();
        let mut off_tally = ReturnTally::default();

        for (&task_id, task_paths) in paths {
            let refs: Vec<&Path> = task_paths.iter().collect();
            self.baseline.fit(&refs, self.config.discount);
            on.tasks.insert(task_id, self.task_samples(task_paths, &mut on_tally)?);

            if let (Some(batch), Some(out)) = (off_sample, off.as_mut()) {
                if let Some(off_paths) = batch.get(&task_id) {
                    out.tasks.insert(task_id, self.task_samples(off_paths, &mut off_tally)?);
                }
            }
        }

        // Off-policy tasks without on-policy paths use the last fitted baseline
        if let (Some(batch), Some(out)) = (off_sample, off.as_mut()) {
            for (&task_id, off_paths) in batch {
                if !out.tasks.contains_key(&task_id) {
                    out.tasks.insert(task_id, self.task_samples(off_paths, &mut off_tally)?);
                }
            }
        }

        on.stats = on_tally.stats();
        Self::log_stats(kv, log, log_prefix, &on.stats);

        if let Some(out) = off.as_mut() {
            out.stats = off_tally.stats();
            if log == LogMode::All {
                kv.logkv(format!("{}Off-NumTrajs", log_prefix), out.stats.n_paths);
                kv.logkv(format!("{}Off-AverageReturn", log_prefix), out.stats.average_return);
            }
        }

        Ok((on, off))
    }

    fn baseline(&self) -> &Bl {
        &self.baseline
    }
}
