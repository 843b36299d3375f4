//! Iteration snapshot persistence.
//!
//! ## Example
//!
//! ```rust,ignore
//! use meta_rl::checkpoint::{Checkpointer, CheckpointerConfig, SnapshotMode};
//!
//! let config = CheckpointerConfig::new("./checkpoints").with_mode(SnapshotMode::Gap(10));
//! let checkpointer = Checkpointer::new(config)?;
//!
//! // Resume a crashed run:
//! let start_itr = checkpointer.resume_itr()?;
//! ```

pub mod checkpointer;

pub use checkpointer::{
    CheckpointError,
    CheckpointInfo,
    Checkpointer,
    CheckpointerConfig,
    MemoryStore,
    SnapshotMode,
    SnapshotStore,
};
