//! The unit of work executed by the [`Runner`](crate::runner::Runner).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ImportResult;
use crate::state::SharedContext;

/// What the runner should do after a step's forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Move on to the next step.
    Continue,
    /// Stop and roll back.
    Halt,
}

/// A forward action with an optional compensation.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Perform the forward action.
    ///
    /// Failures are recorded in `state` (error or cancellation marker) and
    /// answered with [`StepAction::Halt`]; they are never returned.
    async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) -> StepAction;

    /// Undo the forward action during rollback.
    ///
    /// Only called for steps whose `run` returned [`StepAction::Continue`].
    /// Errors are captured by the runner and never replace the run's outcome.
    async fn cleanup(&self, state: &mut SharedContext) -> ImportResult<()> {
        let _ = state;
        Ok(())
    }
}
