//! Context shared by the steps of one import run.
//!
//! Every stage output has its own field, so which values exist after which
//! step is visible in the types rather than hidden behind string keys. The
//! three stop markers (`error`, `cancelled`, `halted`) are how steps report
//! that the run must not go any further.

use std::sync::Arc;

use tracing::warn;

use crate::compute::ComputeProvider;
use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult};
use crate::report::Reporter;
use crate::storage::ObjectStorage;
use crate::types::{Artifact, Template, UploadedObject};

/// Provider clients built once per run and shared by every step.
#[derive(Clone)]
pub struct ProviderHandles {
    /// Compute provider client.
    pub compute: Arc<dyn ComputeProvider>,
    /// Object storage client.
    pub storage: Arc<dyn ObjectStorage>,
}

impl ProviderHandles {
    /// Bundle provider clients.
    #[must_use]
    pub fn new(compute: Arc<dyn ComputeProvider>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { compute, storage }
    }
}

impl std::fmt::Debug for ProviderHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandles").finish_non_exhaustive()
    }
}

/// A cleanup failure captured during rollback.
#[derive(Debug)]
pub struct CleanupFailure {
    /// Step whose cleanup failed.
    pub step: &'static str,
    /// The failure.
    pub error: ImportError,
}

/// Mutable state for a single import run.
pub struct SharedContext {
    config: Arc<ImportConfig>,
    providers: ProviderHandles,
    reporter: Arc<dyn Reporter>,
    artifact: Artifact,
    uploaded_object: Option<UploadedObject>,
    template: Option<Template>,
    error: Option<ImportError>,
    cancelled: bool,
    halted: bool,
    cleanup_failures: Vec<CleanupFailure>,
}

impl SharedContext {
    /// Seed a context with the run's inputs.
    #[must_use]
    pub fn new(
        config: Arc<ImportConfig>,
        providers: ProviderHandles,
        reporter: Arc<dyn Reporter>,
        artifact: Artifact,
    ) -> Self {
        Self {
            config,
            providers,
            reporter,
            artifact,
            uploaded_object: None,
            template: None,
            error: None,
            cancelled: false,
            halted: false,
            cleanup_failures: Vec::new(),
        }
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Provider clients.
    #[must_use]
    pub const fn providers(&self) -> &ProviderHandles {
        &self.providers
    }

    /// Progress reporter.
    #[must_use]
    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Artifact being imported.
    #[must_use]
    pub const fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Image uploaded by the upload step, if any.
    #[must_use]
    pub const fn uploaded_object(&self) -> Option<&UploadedObject> {
        self.uploaded_object.as_ref()
    }

    /// Record the uploaded image.
    pub fn set_uploaded_object(&mut self, uploaded: UploadedObject) {
        self.uploaded_object = Some(uploaded);
    }

    /// Template registered by the register step, if any.
    #[must_use]
    pub const fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Record the registered template.
    pub fn set_template(&mut self, template: Template) {
        self.template = Some(template);
    }

    /// Record a failure. The first failure recorded wins.
    pub fn fail(&mut self, error: ImportError) {
        if error.is_cancelled() {
            self.cancel();
            return;
        }
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Mark the run as cancelled.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Mark the run as halted.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Failure recorded so far, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ImportError> {
        self.error.as_ref()
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the run was halted.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether any stop marker is set.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.error.is_some() || self.cancelled || self.halted
    }

    /// Capture a cleanup failure without touching the run's outcome.
    pub fn record_cleanup_failure(&mut self, step: &'static str, error: ImportError) {
        warn!(step, error = %error, "cleanup failed");
        self.cleanup_failures.push(CleanupFailure { step, error });
    }

    /// Cleanup failures captured during rollback.
    #[must_use]
    pub fn cleanup_failures(&self) -> &[CleanupFailure] {
        &self.cleanup_failures
    }

    /// Resolve the run's outcome.
    ///
    /// Checked in priority order: error, cancellation, halt, template.
    pub fn into_outcome(self) -> ImportResult<Template> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.cancelled {
            return Err(ImportError::Cancelled);
        }
        if self.halted {
            return Err(ImportError::Halted);
        }
        self.template.ok_or_else(|| {
            ImportError::Inconsistent("run completed without registering a template".to_owned())
        })
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("artifact", &self.artifact)
            .field("uploaded_object", &self.uploaded_object)
            .field("template", &self.template)
            .field("error", &self.error)
            .field("cancelled", &self.cancelled)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}
