//! Register the uploaded image as a template.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::compute::{ComputeProvider, OperationStatus, TemplateRequest};
use crate::config::RegistrationConfig;
use crate::error::{ImportError, ImportResult};
use crate::state::SharedContext;
use crate::step::{Step, StepAction};
use crate::types::Template;

/// Creates a template from the uploaded object and waits for the provider
/// to finish.
///
/// A registered template is a result in its own right, so this step has no
/// cleanup.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterStep;

/// Deadline used when the configured limit does not fit in an [`Instant`].
const UNBOUNDED_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Submit `request` and poll until the operation settles.
async fn register(
    compute: &dyn ComputeProvider,
    request: &TemplateRequest,
    settings: &RegistrationConfig,
    cancel: &CancellationToken,
) -> ImportResult<Template> {
    let limit = settings.timeout();
    let deadline = Instant::now()
        .checked_add(limit)
        .unwrap_or_else(|| Instant::now() + UNBOUNDED_DEADLINE);

    let handle = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ImportError::Cancelled),
        result = compute.create_template(request) => result?,
    };
    debug!(operation = %handle.id, zone = %handle.zone, "registration submitted");

    loop {
        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ImportError::Cancelled),
            () = sleep_until(deadline) => return Err(ImportError::RegistrationTimeout { limit }),
            result = compute.poll_operation(&handle) => result?,
        };

        match status {
            OperationStatus::Succeeded(template) => return Ok(template),
            OperationStatus::Failed { detail } => {
                return Err(ImportError::RegistrationFailed { detail })
            }
            OperationStatus::Pending => {
                debug!(operation = %handle.id, "registration pending");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ImportError::Cancelled),
            () = sleep_until(deadline) => return Err(ImportError::RegistrationTimeout { limit }),
            () = sleep(settings.poll_interval()) => {}
        }
    }
}

#[async_trait]
impl Step for RegisterStep {
    fn name(&self) -> &'static str {
        "register"
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) -> StepAction {
        let Some(uploaded) = state.uploaded_object() else {
            state.fail(ImportError::Inconsistent(
                "register ran before an image was uploaded".to_owned(),
            ));
            return StepAction::Halt;
        };

        let request = TemplateRequest::new(state.config(), uploaded);
        let settings = state.config().registration.clone();
        let compute = Arc::clone(&state.providers().compute);

        state.reporter().say(&format!(
            "Registering template {} in zone {}",
            request.name, request.zone
        ));

        let result = register(compute.as_ref(), &request, &settings, cancel).await;
        match result {
            Ok(template) => {
                info!(template_id = %template.id, zone = %template.zone, "template registered");
                state.reporter().say(&format!("Registered {template}"));
                state.set_template(template);
                StepAction::Continue
            }
            Err(e) => {
                if !e.is_cancelled() {
                    state
                        .reporter()
                        .error(&format!("Template registration failed: {e}"));
                }
                state.fail(e);
                StepAction::Halt
            }
        }
    }
}
