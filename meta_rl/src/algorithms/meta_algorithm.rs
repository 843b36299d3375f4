//! Meta-learning algorithm contract.
//!
//! The trainer decides when each operation runs:
//! - `adapt_off_value` before every inner pass except the last, always with
//!   the step-0 on-policy batch and the step-0 off-policy batch
//! - `adapt` once per iteration for the held-out evaluation, on-policy only
//! - `optimize_policy` once per iteration with every inner-pass batch followed
//!   by the off-policy batch
//!
//! Only `optimize_policy` may change the policy's meta-parameters.

use crate::core::ProcessedBatch;

pub trait MetaAlgorithm<P> {
    /// Inner adaptation assisted by off-policy samples.
    fn adapt_off_value(
        &mut self,
        policy: &mut P,
        samples: &ProcessedBatch,
        off_samples: &ProcessedBatch,
    ) -> anyhow::Result<()>;

    /// Inner adaptation from on-policy samples only.
    fn adapt(&mut self, policy: &mut P, samples: &ProcessedBatch) -> anyhow::Result<()>;

    /// Outer meta-update.
    ///
    /// `all_samples` holds one batch per inner pass in step order, then the
    /// processed off-policy batch as the last element.
    fn optimize_policy(&mut self, policy: &mut P, all_samples: &[ProcessedBatch]) -> anyhow::Result<()>;
}
