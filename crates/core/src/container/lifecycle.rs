use std::fmt;

use crate::container::scope::ScopeKind;
use crate::errors::CoreError;

/// Trait for services that need explicit cleanup when their scope ends
pub trait Dispose: Send + Sync + 'static {
    /// Release resources held by the service
    fn dispose(&self) -> Result<(), CoreError>;
}

/// A disposer that reported an error during teardown
#[derive(Debug)]
pub struct DisposalFailure {
    pub id: String,
    pub error: CoreError,
}

/// Outcome of tearing down one scope cache
#[derive(Debug)]
pub struct TeardownReport {
    /// The scope kind that was torn down
    pub scope: ScopeKind,
    /// The context label, e.g. `task#3`
    pub context: String,
    /// Service ids in the order their instances were released
    pub released: Vec<String>,
    /// Disposers that failed; teardown continues past them
    pub failures: Vec<DisposalFailure>,
}

impl TeardownReport {
    pub fn new(scope: ScopeKind, context: impl Into<String>) -> Self {
        Self {
            scope,
            context: context.into(),
            released: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} context {} released [{}]",
            self.scope,
            self.context,
            self.released.join(", ")
        )?;
        if !self.failures.is_empty() {
            write!(f, " with {} disposal failure(s)", self.failures.len())?;
        }
        Ok(())
    }
}
