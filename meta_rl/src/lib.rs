//! # Meta RL: Off-Policy Assisted Meta-Policy Search
//!
//! Gradient-based meta-reinforcement learning where the inner adaptation
//! step is assisted by paths replayed from earlier iterations.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MetaTrainer                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   Sampler ──paths──► SampleProcessor ──ProcessedBatch──┐         │
//! │     │  ▲                  ▲                            ▼         │
//! │     │  └── &Policy        │ off-policy paths     MetaAlgorithm   │
//! │     ▼                     │                      (&mut Policy)   │
//! │   ReplayBuffer ───────────┘                            │         │
//! │                                                        ▼         │
//! │   KvAccumulator ──► MetricsLogger      SnapshotStore ◄─ snapshot │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trainer owns the policy, the explicit [`ExecutionContext`] and the
//! metrics accumulator, and lends them to collaborators for the duration of
//! each call. Value networks ([`MlpValueNet`]) register their variables in
//! the context when built and are initialized once at the start of a run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meta_rl::*;
//!
//! let config = TrainerConfig::default()
//!     .with_n_itr(200)
//!     .with_num_inner_grad_steps(1)
//!     .with_seeds(vec![1, 2, 3])
//!     .build()?;
//!
//! let mut trainer = MetaTrainer::new(
//!     FirstOrderMaml::new(MamlConfig::default())?,
//!     env.clone(),
//!     MetaSampler::new(env, SamplerConfig::default())?,
//!     MetaSampleProcessor::new(LinearFeatureBaseline::default(), ProcessorConfig::default())?,
//!     policy,
//!     critics,
//!     config,
//!     ctx,
//!     ConsoleLogger::new(),
//!     Checkpointer::new(CheckpointerConfig::default())?,
//! )?;
//! let result = trainer.train()?;
//! ```

pub mod algorithms;
pub mod checkpoint;
pub mod core;
pub mod env;
pub mod metrics;
pub mod policy;
pub mod processing;
pub mod sampler;
pub mod trainer;
pub mod values;

#[cfg(test)]
pub(crate) mod testing;

pub use core::{
    BatchStats, ContextError, ExecutionContext, OffPolicyBatch, ParamMap, ParamValue, Path,
    PathsPerTask, ProcessedBatch, Task, TaskId, TaskSamples,
};

pub use trainer::{
    ConfigError, CriticSet, IterationSnapshot, MetaTrainer, TrainError, TrainerConfig,
    TrainingResult,
};

pub use algorithms::{FirstOrderMaml, MamlConfig, MetaAlgorithm};
pub use sampler::{MetaSampler, OffPolicyBuffer, Sampler, SamplerConfig, TaskReplayBuffer};
pub use processing::{
    Baseline, LinearFeatureBaseline, LogMode, MetaSampleProcessor, ProcessorConfig,
    SampleProcessor, ZeroBaseline,
};
pub use policy::{ActingPolicy, MetaPolicy, PointPolicy, PointPolicyConfig};
pub use env::{MetaEnv, PointEnv, PointEnvConfig};

// Value estimation
pub use values::{
    EstimatorState, MlpValueNet, PersistentEstimator, ValueEstimator, ValueNetConfig,
    ValueNetError,
};

pub use metrics::{
    init_tracing, CSVLogger, ConsoleLogger, KvAccumulator, KvRecord, MemoryLogger, MetricsLogger,
    MultiLogger,
};

// Snapshot persistence
pub use checkpoint::{
    CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig, MemoryStore, SnapshotMode,
    SnapshotStore,
};
