//! Off-policy assisted meta-trainer.
//!
//! One outer iteration:
//!
//! ```text
//! select tasks -> pre-update switch
//!   -> inner passes (step 0..=K): sample, process, diagnostics, adapt (step < K)
//!   -> held-out pass: pre-update switch, on-policy adapt, sample, process
//!   -> outer update -> snapshot -> metrics flush
//! ```
//!
//! Step 0 additionally draws an off-policy batch from the sampler's replay
//! buffer. The inner-pass paths of an iteration are stored in that buffer
//! only after the held-out pass, so the draw never sees the current
//! iteration's rollouts. Every inner adaptation is anchored to the step-0 on-policy batch
//! and the step-0 off-policy batch; later passes only measure the adapted
//! policy. The outer update receives one processed batch per inner pass
//! followed by the processed off-policy batch (`K + 2` batches).

use burn::tensor::backend::Backend;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

use super::config::{ConfigError, TrainerConfig};
use crate::algorithms::MetaAlgorithm;
use crate::checkpoint::{CheckpointError, SnapshotStore};
use crate::core::{
    flatten_paths, ContextError, ExecutionContext, Path, PathsPerTask, ProcessedBatch,
};
use crate::env::MetaEnv;
use crate::metrics::{KvAccumulator, MetricsLogger};
use crate::policy::MetaPolicy;
use crate::processing::{Baseline, LogMode, SampleProcessor};
use crate::sampler::{OffPolicyBuffer, Sampler};

/// Errors that abort a training run.
///
/// Collaborator failures are tagged with the phase they occurred in; their
/// message and source chain pass through unchanged.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Sampler(anyhow::Error),
    #[error(transparent)]
    Processing(anyhow::Error),
    #[error(transparent)]
    Algorithm(anyhow::Error),
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// The twin critics and the value baseline kept alongside the policy.
///
/// They are built into the trainer's execution context and initialized at
/// the start of `train`, but the iteration loop does not update them.
#[derive(Debug, Clone)]
pub struct CriticSet<V> {
    pub critic_1: V,
    pub critic_2: V,
    pub baseline_value: V,
}

impl<V> CriticSet<V> {
    pub fn new(critic_1: V, critic_2: V, baseline_value: V) -> Self {
        Self {
            critic_1,
            critic_2,
            baseline_value,
        }
    }
}

/// Per-iteration returns of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingResult {
    /// Average return of the last inner pass
    pub step_average_return: Vec<f32>,
    /// Average return of the held-out pass
    pub test_step_average_return: Vec<f32>,
}

impl TrainingResult {
    pub fn len(&self) -> usize {
        self.step_average_return.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_average_return.is_empty()
    }

    /// Results keyed the way the metrics are labelled.
    pub fn to_map(&self) -> BTreeMap<&'static str, Vec<f32>> {
        BTreeMap::from([
            ("Step_1-AverageReturn", self.step_average_return.clone()),
            ("test-Step_1-AverageReturn", self.test_step_average_return.clone()),
        ])
    }
}

/// What gets persisted after every iteration.
#[derive(Debug, Serialize)]
pub struct IterationSnapshot<'a, P, E, Bl> {
    pub itr: usize,
    pub policy: &'a P,
    pub env: &'a E,
    pub baseline: &'a Bl,
}

fn step_prefix(step: usize) -> String {
    format!("Step_{}-", step)
}

const TEST_PREFIX: &str = "test-Step_1-";

/// Orchestrates off-policy assisted meta-training.
pub struct MetaTrainer<A, E, S, Pr, P, V, B, L, St>
where
    B: Backend,
{
    algo: A,
    env: E,
    sampler: S,
    sample_processor: Pr,
    policy: P,
    critics: CriticSet<V>,
    config: TrainerConfig,
    ctx: ExecutionContext<B>,
    logger: L,
    store: St,
    kv: KvAccumulator,
}

impl<A, E, S, Pr, P, V, B, L, St> MetaTrainer<A, E, S, Pr, P, V, B, L, St>
where
    A: MetaAlgorithm<P>,
    E: MetaEnv + Serialize,
    S: Sampler<P>,
    Pr: SampleProcessor,
    Pr::Baseline: Serialize,
    P: MetaPolicy + Serialize,
    B: Backend,
    L: MetricsLogger,
    St: SnapshotStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algo: A,
        env: E,
        sampler: S,
        sample_processor: Pr,
        policy: P,
        critics: CriticSet<V>,
        config: TrainerConfig,
        ctx: ExecutionContext<B>,
        logger: L,
        store: St,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            algo,
            env,
            sampler,
            sample_processor,
            policy,
            critics,
            config,
            ctx,
            logger,
            store,
            kv: KvAccumulator::new(),
        })
    }

    /// Run iterations `start_itr..n_itr`.
    ///
    /// The execution context is closed when this returns, on success and on
    /// error alike. Any collaborator failure aborts the run.
    pub fn train(&mut self) -> Result<TrainingResult, TrainError> {
        let result = self.run();
        self.ctx.close();
        match &result {
            Ok(res) => tracing::info!(iterations = res.len(), "Training finished"),
            Err(e) => tracing::error!(error = %e, "Training aborted"),
        }
        result
    }

    fn run(&mut self) -> Result<TrainingResult, TrainError> {
        self.sampler.set_seeds(&self.config.seeds);
        let resolved = self.ctx.initialize_uninitialized()?;
        tracing::debug!(variables = resolved.len(), "initialized variables");

        let mut result = TrainingResult::default();
        let n_steps = self.config.num_inner_grad_steps;
        let start_time = Instant::now();

        for itr in self.config.start_itr..self.config.n_itr {
            let itr_start = Instant::now();
            tracing::info!("---------------- Iteration {} ----------------", itr);
            tracing::info!("Sampling set of tasks/goals for this meta-batch...");

            let (_tasks, task_ids) = self
                .sampler
                .update_tasks_with_id()
                .map_err(TrainError::Sampler)?;

            self.policy.switch_to_pre_update();

            let mut all_samples: Vec<ProcessedBatch> = Vec::with_capacity(n_steps + 2);
            let mut off_samples: Option<ProcessedBatch> = None;
            let mut inner_paths: Vec<PathsPerTask> = Vec::with_capacity(n_steps + 1);
            let mut sampling_time = 0.0f64;
            let mut proc_time = 0.0f64;
            let mut inner_step_time = 0.0f64;
            let inner_start = Instant::now();

            for step in 0..=n_steps {
                let prefix = step_prefix(step);
                tracing::info!("** Step {} **", step);

                tracing::info!("Obtaining samples...");
                let t = Instant::now();
                let paths = self
                    .sampler
                    .obtain_samples(&self.policy, &task_ids, step, true, &prefix, &mut self.kv)
                    .map_err(TrainError::Sampler)?;
                sampling_time += t.elapsed().as_secs_f64();

                tracing::info!("Processing samples...");
                let t = Instant::now();
                let processed = if step == 0 {
                    let off_paths = self
                        .sampler
                        .buffer_mut()
                        .sample(&task_ids, self.config.sample_batch_size)
                        .map_err(TrainError::Sampler)?;
                    let (processed, off) = self
                        .sample_processor
                        .process_samples(Some(&off_paths), &paths, LogMode::All, &prefix, &mut self.kv)
                        .map_err(TrainError::Processing)?;
                    let off = off.ok_or_else(|| {
                        TrainError::Processing(anyhow::anyhow!(
                            "no processed off-policy batch returned for a given off-policy sample"
                        ))
                    })?;
                    off_samples = Some(off);
                    processed
                } else {
                    let (processed, _) = self
                        .sample_processor
                        .process_samples(None, &paths, LogMode::All, &prefix, &mut self.kv)
                        .map_err(TrainError::Processing)?;
                    processed
                };
                proc_time += t.elapsed().as_secs_f64();

                self.log_diagnostics(&flatten_paths(&paths), &prefix);
                all_samples.push(processed);
                inner_paths.push(paths);

                let t = Instant::now();
                if step < n_steps {
                    tracing::info!("Computing inner policy updates...");
                    let off = off_samples.as_ref().ok_or_else(|| {
                        TrainError::Processing(anyhow::anyhow!("off-policy batch missing"))
                    })?;
                    self.algo
                        .adapt_off_value(&mut self.policy, &all_samples[0], off)
                        .map_err(TrainError::Algorithm)?;
                }
                inner_step_time += t.elapsed().as_secs_f64();
            }

            // Step 0 always ran, so the off-policy batch is present
            all_samples.push(off_samples.take().unwrap_or_default());

            tracing::info!("** test **");
            let t = Instant::now();
            self.policy.switch_to_pre_update();

            tracing::info!("test-Computing inner policy updates...");
            self.algo
                .adapt(&mut self.policy, &all_samples[0])
                .map_err(TrainError::Algorithm)?;

            tracing::info!("test-Obtaining samples...");
            let test_paths = self
                .sampler
                .obtain_samples(&self.policy, &task_ids, 1, true, TEST_PREFIX, &mut self.kv)
                .map_err(TrainError::Sampler)?;

            tracing::info!("test-Processing samples...");
            let (test_processed, _) = self
                .sample_processor
                .process_samples(None, &test_paths, LogMode::All, TEST_PREFIX, &mut self.kv)
                .map_err(TrainError::Processing)?;
            inner_step_time += t.elapsed().as_secs_f64();

            let buffer = self.sampler.buffer_mut();
            for paths in &inner_paths {
                buffer.add_paths(paths);
            }
            tracing::debug!(stored = buffer.len(), "replay buffer updated");

            let total_inner_time = inner_start.elapsed().as_secs_f64();

            let maml_start = Instant::now();
            tracing::info!("Optimizing policy...");
            let outer_start = Instant::now();
            self.algo
                .optimize_policy(&mut self.policy, &all_samples)
                .map_err(TrainError::Algorithm)?;

            self.kv.logkv("Itr", itr);
            self.kv.logkv("n_timesteps", self.sampler.total_timesteps_sampled());
            self.kv.logkv("Time-OuterStep", outer_start.elapsed().as_secs_f64());
            self.kv.logkv("Time-TotalInner", total_inner_time);
            self.kv.logkv("Time-InnerStep", inner_step_time);
            self.kv.logkv("Time-SampleProc", proc_time);
            self.kv.logkv("Time-Sampling", sampling_time);
            self.kv.logkv("Time", start_time.elapsed().as_secs_f64());
            self.kv.logkv("ItrTime", itr_start.elapsed().as_secs_f64());
            self.kv.logkv("Time-MAMLSteps", maml_start.elapsed().as_secs_f64());

            tracing::info!("Saving snapshot...");
            let snapshot = serde_json::to_value(self.get_itr_snapshot(itr))
                .map_err(CheckpointError::from)?;
            self.store.save_itr_params(itr, &snapshot)?;
            tracing::info!("Saved");

            self.kv.dump(&mut self.logger);

            result
                .step_average_return
                .push(all_samples[n_steps].stats.average_return);
            result
                .test_step_average_return
                .push(test_processed.stats.average_return);
        }

        Ok(result)
    }

    /// Snapshot of the current policy, environment and baseline.
    pub fn get_itr_snapshot(&self, itr: usize) -> IterationSnapshot<'_, P, E, Pr::Baseline> {
        IterationSnapshot {
            itr,
            policy: &self.policy,
            env: &self.env,
            baseline: self.sample_processor.baseline(),
        }
    }

    /// Per-pass diagnostics from the environment, policy and baseline.
    pub fn log_diagnostics(&mut self, paths: &[&Path], prefix: &str) {
        self.env.log_diagnostics(paths, prefix, &mut self.kv);
        self.policy.log_diagnostics(paths, prefix, &mut self.kv);
        self.sample_processor
            .baseline()
            .log_diagnostics(paths, prefix, &mut self.kv);
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn algo(&self) -> &A {
        &self.algo
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn critics(&self) -> &CriticSet<V> {
        &self.critics
    }

    pub fn ctx(&self) -> &ExecutionContext<B> {
        &self.ctx
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Number of off-policy paths currently stored by the sampler.
    pub fn buffer_len(&self) -> usize {
        self.sampler.buffer().len()
    }
}
