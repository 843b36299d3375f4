//! Meta-learning algorithms.
//!
//! - `meta_algorithm`: the adaptation / meta-update contract driven by the trainer
//! - `first_order_maml`: first-order MAML with off-policy assisted inner steps

pub mod first_order_maml;
pub mod meta_algorithm;

pub use first_order_maml::{FirstOrderMaml, MamlConfig};
pub use meta_algorithm::MetaAlgorithm;
