//! Explicit numerical execution context.
//!
//! Replaces a process-wide session: the trainer owns one `ExecutionContext`,
//! hands it by reference to every collaborator that evaluates tensors, and
//! closes it when the run ends, whether the run succeeded or failed.
//!
//! The context carries the burn device and a registry of named variables with
//! their initialization state. Components register their variables when they
//! build their graph; restoring from a checkpoint marks them `Restored`.
//! [`ExecutionContext::initialize_uninitialized`] resolves only the variables
//! that are still `Uninitialized`, so restored values are never disturbed.

use burn::tensor::backend::Backend;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by context operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    /// The context was already closed.
    #[error("execution context is closed")]
    Closed,
}

/// Initialization state of a registered variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableState {
    /// Registered but not yet initialized
    Uninitialized,
    /// Initialized by `initialize_uninitialized`
    Initialized,
    /// Values loaded from a checkpoint
    Restored,
}

/// Numerical execution context.
#[derive(Debug)]
pub struct ExecutionContext<B: Backend> {
    device: B::Device,
    variables: BTreeMap<String, VariableState>,
    open: bool,
}

impl<B: Backend> ExecutionContext<B> {
    /// Create an open context on `device`.
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            variables: BTreeMap::new(),
            open: true,
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Fail with [`ContextError::Closed`] if the context is closed.
    pub fn ensure_open(&self) -> Result<(), ContextError> {
        if self.open {
            Ok(())
        } else {
            Err(ContextError::Closed)
        }
    }

    /// Register variables as uninitialized.
    ///
    /// Names that are already registered keep their current state.
    pub fn register<I, S>(&mut self, names: I) -> Result<(), ContextError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        for name in names {
            self.variables
                .entry(name.into())
                .or_insert(VariableState::Uninitialized);
        }
        Ok(())
    }

    /// Mark variables as restored from stored values.
    ///
    /// Unknown names are registered on the fly.
    pub fn mark_restored<I, S>(&mut self, names: I) -> Result<(), ContextError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        for name in names {
            self.variables.insert(name.into(), VariableState::Restored);
        }
        Ok(())
    }

    /// Initialize every variable that is still uninitialized.
    ///
    /// Returns the names that were resolved by this call. Calling it again
    /// resolves nothing.
    pub fn initialize_uninitialized(&mut self) -> Result<Vec<String>, ContextError> {
        self.ensure_open()?;
        let mut resolved = Vec::new();
        for (name, state) in self.variables.iter_mut() {
            if *state == VariableState::Uninitialized {
                *state = VariableState::Initialized;
                resolved.push(name.clone());
            }
        }
        Ok(resolved)
    }

    /// Make sure every registered variable has a value.
    pub fn ensure_initialized(&mut self) -> Result<(), ContextError> {
        self.initialize_uninitialized().map(|_| ())
    }

    pub fn state(&self, name: &str) -> Option<VariableState> {
        self.variables.get(name).copied()
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// Release the context. Idempotent.
    pub fn close(&mut self) {
        if self.open {
            tracing::debug!(variables = self.variables.len(), "closing execution context");
        }
        self.open = false;
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn ctx() -> ExecutionContext<TestBackend> {
        ExecutionContext::new(Default::default())
    }

    #[test]
    fn test_initialize_only_touches_uninitialized() {
        let mut ctx = ctx();
        ctx.register(["a", "b"]).unwrap();
        ctx.mark_restored(["c"]).unwrap();

        let resolved = ctx.initialize_uninitialized().unwrap();
        assert_eq!(resolved, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ctx.state("c"), Some(VariableState::Restored));
        assert_eq!(ctx.state("a"), Some(VariableState::Initialized));

        // Second call is a no-op
        assert!(ctx.initialize_uninitialized().unwrap().is_empty());
    }

    #[test]
    fn test_reregistration_keeps_state() {
        let mut ctx = ctx();
        ctx.register(["a"]).unwrap();
        ctx.initialize_uninitialized().unwrap();
        ctx.register(["a"]).unwrap();
        assert_eq!(ctx.state("a"), Some(VariableState::Initialized));
    }

    #[test]
    fn test_closed_context_rejects_work() {
        let mut ctx = ctx();
        ctx.close();
        assert!(!ctx.is_open());
        assert_eq!(ctx.initialize_uninitialized(), Err(ContextError::Closed));
        assert_eq!(ctx.register(["x"]), Err(ContextError::Closed));
    }
}
