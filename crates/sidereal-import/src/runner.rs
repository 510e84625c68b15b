//! Sequential step execution with reverse-order rollback.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::SharedContext;
use crate::step::{Step, StepAction};

/// Runs steps strictly in order over one [`SharedContext`].
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
}

impl Runner {
    /// Create a runner for `steps`.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Names of the planned steps, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Execute every step until one stops the run, then roll back.
    ///
    /// Cancellation is checked before each step. When a step halts, or leaves
    /// a stop marker in `state`, the cleanups of every step that completed
    /// are run in reverse order. The outcome is left in `state`.
    pub async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) {
        let mut executed: Vec<&dyn Step> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let step = step.as_ref();

            if cancel.is_cancelled() {
                info!(step = step.name(), "cancelled before step started");
                state.cancel();
                break;
            }

            debug!(step = step.name(), "running step");
            let action = step.run(cancel, state).await;

            if action == StepAction::Halt {
                if !state.is_stopped() {
                    state.halt();
                }
                debug!(step = step.name(), "step halted");
                break;
            }

            executed.push(step);

            if state.is_stopped() {
                debug!(step = step.name(), "step left a stop marker");
                break;
            }
        }

        if state.is_stopped() {
            Self::rollback(&executed, state).await;
        }
    }

    async fn rollback(executed: &[&dyn Step], state: &mut SharedContext) {
        info!(steps = executed.len(), "rolling back");

        for step in executed.iter().rev() {
            debug!(step = step.name(), "cleaning up step");
            if let Err(e) = step.cleanup(state).await {
                warn!(step = step.name(), error = %e, "step cleanup failed");
                state.record_cleanup_failure(step.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("steps", &self.step_names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::compute::MemoryCompute;
    use crate::config::ImportConfig;
    use crate::error::{ImportError, ImportResult};
    use crate::state::test_support::context;
    use crate::storage::MemoryStorage;
    use crate::types::{Template, TemplateId};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Continue,
        Fail,
        Halt,
        CancelToken,
        Produce,
        FailCleanup,
    }

    struct Recording {
        name: &'static str,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Step for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) -> StepAction {
            self.log.lock().push(format!("run:{}", self.name));
            match self.behaviour {
                Behaviour::Continue | Behaviour::FailCleanup => StepAction::Continue,
                Behaviour::Fail => {
                    state.fail(ImportError::compute(format!("{} failed", self.name)));
                    StepAction::Halt
                }
                Behaviour::Halt => StepAction::Halt,
                Behaviour::CancelToken => {
                    cancel.cancel();
                    StepAction::Continue
                }
                Behaviour::Produce => {
                    state.set_template(Template {
                        id: TemplateId::new("tmpl-123"),
                        name: "my-template".to_owned(),
                        checksum: String::new(),
                        zone: "ch-gva-2".to_owned(),
                        created_at: None,
                        state: None,
                    });
                    StepAction::Continue
                }
            }
        }

        async fn cleanup(&self, _state: &mut SharedContext) -> ImportResult<()> {
            self.log.lock().push(format!("cleanup:{}", self.name));
            match self.behaviour {
                Behaviour::FailCleanup => Err(ImportError::storage("cleanup denied")),
                _ => Ok(()),
            }
        }
    }

    struct Harness {
        log: Arc<Mutex<Vec<String>>>,
        steps: Vec<Box<dyn Step>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                steps: Vec::new(),
            }
        }

        fn step(mut self, name: &'static str, behaviour: Behaviour) -> Self {
            self.steps.push(Box::new(Recording {
                name,
                behaviour,
                log: Arc::clone(&self.log),
            }));
            self
        }

        async fn run(self, cancel: &CancellationToken) -> (SharedContext, Vec<String>) {
            let mut state = context(
                ImportConfig::default(),
                Arc::new(MemoryCompute::succeeding("tmpl-123")),
                Arc::new(MemoryStorage::new()),
                std::path::Path::new("disk.img"),
            );
            Runner::new(self.steps).run(cancel, &mut state).await;
            let log = self.log.lock().clone();
            (state, log)
        }
    }

    #[tokio::test]
    async fn runs_every_step_in_order_without_rollback() {
        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .step("b", Behaviour::Produce)
            .step("c", Behaviour::Continue)
            .run(&CancellationToken::new())
            .await;

        assert_eq!(log, ["run:a", "run:b", "run:c"]);
        assert!(state.into_outcome().is_ok());
    }

    #[tokio::test]
    async fn failure_rolls_back_completed_steps_in_reverse() {
        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .step("b", Behaviour::Continue)
            .step("c", Behaviour::Fail)
            .step("d", Behaviour::Continue)
            .run(&CancellationToken::new())
            .await;

        assert_eq!(log, ["run:a", "run:b", "run:c", "cleanup:b", "cleanup:a"]);
        assert!(matches!(state.into_outcome(), Err(ImportError::Compute(_))));
    }

    #[tokio::test]
    async fn bare_halt_sets_halted_marker() {
        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .step("b", Behaviour::Halt)
            .run(&CancellationToken::new())
            .await;

        assert_eq!(log, ["run:a", "run:b", "cleanup:a"]);
        assert!(state.is_halted());
        assert!(matches!(state.into_outcome(), Err(ImportError::Halted)));
    }

    #[tokio::test]
    async fn cancellation_is_checked_before_each_step() {
        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .step("b", Behaviour::CancelToken)
            .step("c", Behaviour::Produce)
            .run(&CancellationToken::new())
            .await;

        assert_eq!(log, ["run:a", "run:b", "cleanup:b", "cleanup:a"]);
        assert!(state.template().is_none());
        assert!(matches!(state.into_outcome(), Err(ImportError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .run(&cancel)
            .await;

        assert!(log.is_empty());
        assert!(state.is_cancelled());
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_stop_rollback_or_mask_error() {
        let (state, log) = Harness::new()
            .step("a", Behaviour::Continue)
            .step("b", Behaviour::FailCleanup)
            .step("c", Behaviour::Fail)
            .run(&CancellationToken::new())
            .await;

        assert_eq!(log, ["run:a", "run:b", "run:c", "cleanup:b", "cleanup:a"]);
        assert_eq!(state.cleanup_failures().len(), 1);
        assert_eq!(state.cleanup_failures()[0].step, "b");
        let err = state.into_outcome().unwrap_err();
        assert_eq!(err.to_string(), "compute provider error: c failed");
    }

    #[tokio::test]
    async fn completion_without_template_is_inconsistent() {
        let (state, _) = Harness::new()
            .step("a", Behaviour::Continue)
            .run(&CancellationToken::new())
            .await;

        assert!(matches!(
            state.into_outcome(),
            Err(ImportError::Inconsistent(_))
        ));
    }

    #[test]
    fn debug_lists_step_names() {
        let harness = Harness::new()
            .step("upload", Behaviour::Continue)
            .step("register", Behaviour::Continue);
        let runner = Runner::new(harness.steps);
        assert_eq!(runner.step_names(), ["upload", "register"]);
        assert!(format!("{runner:?}").contains("register"));
    }
}
