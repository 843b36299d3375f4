//! State-value estimator capability.
//!
//! A value estimator maps `(observation, task id)` to a scalar value, for
//! current states and for successor states (used in temporal-difference
//! targets), one at a time or batched per task group.
//!
//! Lifecycle:
//! 1. construct from constructor arguments
//! 2. `build_graph` exactly once (registers variables in the context)
//! 3. evaluate / read / assign parameters
//!
//! Every method has a default that fails with
//! [`ValueNetError::Unimplemented`], so a variant only overrides what it
//! supports and anything else surfaces immediately.

use burn::module::Param;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    ContextError, ExecutionContext, KeyMismatch, LayoutMismatch, ParamError, ParamMap, ParamValue,
    Path, TaskId,
};
use crate::metrics::KvAccumulator;

/// Errors raised by value estimators.
#[derive(Debug, Error)]
pub enum ValueNetError {
    /// Evaluation or parameter access before `build_graph`.
    #[error("value network graph has not been built")]
    UnbuiltNetwork,
    /// `build_graph` called a second time.
    #[error("value network graph was already built")]
    AlreadyBuilt,
    /// Bulk assignment with a different key set or order.
    #[error(transparent)]
    ParameterMismatch(#[from] KeyMismatch),
    /// Bulk assignment with a value of the wrong shape.
    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// Value whose data length disagrees with its shape.
    #[error("{name} has shape {shape:?} but {found} elements")]
    ElementCount {
        name: String,
        shape: Vec<usize>,
        found: usize,
    },
    /// Operation not provided by this estimator.
    #[error("{0} is not implemented by this value estimator")]
    Unimplemented(&'static str),
    /// Observation has the wrong dimensionality.
    #[error("observation dimension mismatch: expected {expected}, found {found}")]
    ObservationDim { expected: usize, found: usize },
    /// Task id does not fit the task encoding.
    #[error("task id {task_id} out of range for {task_id_dim} task slots")]
    TaskOutOfRange { task_id: TaskId, task_id_dim: usize },
    /// Batched call with a different number of task groups and task ids.
    #[error("batch has {groups} observation groups but {task_ids} task ids")]
    BatchMismatch { groups: usize, task_ids: usize },
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Tensor data could not be read back.
    #[error("tensor data error: {0}")]
    Tensor(String),
    #[error("state record error: {0}")]
    Record(#[from] serde_json::Error),
}

impl From<LayoutMismatch> for ValueNetError {
    fn from(err: LayoutMismatch) -> Self {
        match err {
            LayoutMismatch::Shape {
                name,
                expected,
                found,
            } => ValueNetError::ShapeMismatch {
                name,
                expected,
                found,
            },
            LayoutMismatch::ElementCount { name, shape, found } => {
                ValueNetError::ElementCount { name, shape, found }
            }
        }
    }
}

impl From<ParamError> for ValueNetError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::Keys(e) => e.into(),
            ParamError::Layout(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValueNetError>;

/// Non-materialized handle to a trainable tensor.
#[derive(Debug, Clone)]
pub enum ParamHandle<B: Backend> {
    Matrix(Param<Tensor<B, 2>>),
    Vector(Param<Tensor<B, 1>>),
}

impl<B: Backend> ParamHandle<B> {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ParamHandle::Matrix(p) => p.val().dims().to_vec(),
            ParamHandle::Vector(p) => p.val().dims().to_vec(),
        }
    }
}

/// State-value estimator.
pub trait ValueEstimator<B: Backend> {
    /// Construct the estimator's computation. Must run exactly once before
    /// any evaluation.
    fn build_graph(&mut self, _ctx: &mut ExecutionContext<B>) -> Result<()> {
        Err(ValueNetError::Unimplemented("build_graph"))
    }

    /// Value of a single observation in task `task_id`.
    fn get_state_value(&self, _observation: &[f32], _task_id: TaskId) -> Result<f32> {
        Err(ValueNetError::Unimplemented("get_state_value"))
    }

    /// Values for groups of observations, one group per task id.
    ///
    /// Output has the same group and element order as the input.
    fn get_state_values(
        &self,
        _observations: &[Vec<Vec<f32>>],
        _task_ids: &[TaskId],
    ) -> Result<Vec<Vec<f32>>> {
        Err(ValueNetError::Unimplemented("get_state_values"))
    }

    /// Value of a successor state.
    fn get_next_state_value(&self, _next_observation: &[f32], _task_id: TaskId) -> Result<f32> {
        Err(ValueNetError::Unimplemented("get_next_state_value"))
    }

    /// Successor-state values, grouped like [`get_state_values`](Self::get_state_values).
    fn get_next_state_values(
        &self,
        _next_observations: &[Vec<Vec<f32>>],
        _task_ids: &[TaskId],
    ) -> Result<Vec<Vec<f32>>> {
        Err(ValueNetError::Unimplemented("get_next_state_values"))
    }

    /// Trainable tensors by name, in a fixed order.
    fn get_params(&self) -> Result<ParamMap<ParamHandle<B>>> {
        Err(ValueNetError::Unimplemented("get_params"))
    }

    /// Current parameter values, read through `ctx`.
    fn get_param_values(&self, _ctx: &ExecutionContext<B>) -> Result<ParamMap<ParamValue>> {
        Err(ValueNetError::Unimplemented("get_param_values"))
    }

    /// Assign all parameters at once.
    ///
    /// `values` must have exactly the keys of [`get_params`](Self::get_params),
    /// in the same order. Nothing is written unless every check passes.
    fn set_params(
        &mut self,
        _ctx: &ExecutionContext<B>,
        _values: &ParamMap<ParamValue>,
    ) -> Result<()> {
        Err(ValueNetError::Unimplemented("set_params"))
    }

    /// Log extra information per iteration based on the collected paths.
    fn log_diagnostics(&self, _paths: &[&Path], _prefix: &str, _kv: &mut KvAccumulator) {}
}

/// Captured estimator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorState<A> {
    pub constructor_args: A,
    pub parameter_values: ParamMap<ParamValue>,
}

/// Estimators that can be captured and rebuilt.
pub trait PersistentEstimator<B: Backend>: ValueEstimator<B> + Sized {
    type Args: Clone + Serialize + DeserializeOwned;

    fn constructor_args(&self) -> Self::Args;

    fn from_args(args: Self::Args) -> Self;

    /// Capture constructor arguments and materialized parameters.
    fn serialize(&self, ctx: &ExecutionContext<B>) -> Result<EstimatorState<Self::Args>> {
        Ok(EstimatorState {
            constructor_args: self.constructor_args(),
            parameter_values: self.get_param_values(ctx)?,
        })
    }

    /// Rebuild from a captured state: construct, build the graph, make sure
    /// the context is initialized, then assign the stored parameters.
    fn deserialize(state: EstimatorState<Self::Args>, ctx: &mut ExecutionContext<B>) -> Result<Self> {
        let mut estimator = Self::from_args(state.constructor_args);
        estimator.build_graph(ctx)?;
        ctx.ensure_initialized()?;
        estimator.set_params(ctx, &state.parameter_values)?;
        ctx.mark_restored(state.parameter_values.keys())?;
        Ok(estimator)
    }

    fn to_json(&self, ctx: &ExecutionContext<B>) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize(ctx)?)?)
    }

    fn from_json(json: &str, ctx: &mut ExecutionContext<B>) -> Result<Self> {
        let state: EstimatorState<Self::Args> = serde_json::from_str(json)?;
        Self::deserialize(state, ctx)
    }
}
