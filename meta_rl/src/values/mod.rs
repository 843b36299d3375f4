//! State-value estimation networks.
//!
//! - [`ValueEstimator`]: the capability consumed by critics and baselines
//! - [`PersistentEstimator`]: capture / rebuild as `{constructor_args, parameter_values}`
//! - [`MlpValueNet`]: burn MLP implementation with a soft-updated target copy

pub mod mlp_value_net;
pub mod value_net;

pub use mlp_value_net::{Activation, MlpValueNet, ValueMlp, ValueNetConfig};
pub use value_net::{
    EstimatorState, ParamHandle, PersistentEstimator, ValueEstimator, ValueNetError,
};

#[cfg(test)]
mod tests;
