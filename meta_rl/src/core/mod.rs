//! Core types shared across the trainer and its collaborators.

pub mod context;
pub mod params;
pub mod path;
pub mod processed;

pub use context::{ContextError, ExecutionContext, VariableState};
pub use params::{soft_update, KeyMismatch, LayoutMismatch, ParamError, ParamMap, ParamValue};
pub use path::{
    count_timesteps, flatten_paths, OffPolicyBatch, Path, PathsPerTask, StepInfo, Task, TaskId,
};
pub use processed::{BatchStats, ProcessedBatch, TaskSamples};
