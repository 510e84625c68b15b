//! Entry point tying configuration, providers and steps together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compute::ComputeClient;
use crate::config::ImportConfig;
use crate::error::ImportResult;
use crate::report::{Redactor, Reporter, TracingReporter};
use crate::runner::Runner;
use crate::state::{ProviderHandles, SharedContext};
use crate::steps;
use crate::storage::S3Storage;
use crate::types::{Artifact, Template};

/// Imports artifacts as templates.
///
/// One importer can run any number of imports; each gets a fresh
/// [`SharedContext`].
pub struct Importer {
    config: Arc<ImportConfig>,
    providers: ProviderHandles,
    reporter: Arc<dyn Reporter>,
}

impl Importer {
    /// Create an importer over existing provider clients.
    #[must_use]
    pub fn new(
        config: ImportConfig,
        providers: ProviderHandles,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            providers,
            reporter,
        }
    }

    /// Validate `config` and build the S3 and compute clients it describes.
    ///
    /// The configured credentials are redacted from everything reported.
    pub fn from_config(config: ImportConfig) -> ImportResult<Self> {
        config.validate()?;

        let storage = Arc::new(S3Storage::from_config(&config));
        let compute = Arc::new(ComputeClient::new(&config)?);
        let reporter = Arc::new(TracingReporter::new(Redactor::from_config(&config)));

        info!(
            zone = %config.zone,
            storage_endpoint = %config.storage_endpoint(),
            compute_endpoint = %config.compute_endpoint(),
            "provider clients configured"
        );

        Ok(Self::new(
            config,
            ProviderHandles::new(compute, storage),
            reporter,
        ))
    }

    /// Configuration used for every import.
    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import `artifact`, returning the registered template.
    ///
    /// Artifacts from builders outside the allow-list are rejected before
    /// anything is uploaded. Cancelling `cancel` stops the run at the next
    /// opportunity and rolls back the upload.
    pub async fn import(
        &self,
        artifact: Artifact,
        cancel: &CancellationToken,
    ) -> ImportResult<Template> {
        let producer = artifact.producer()?;
        info!(builder = %producer, files = artifact.files.len(), "starting import");

        let runner = Runner::new(steps::plan(self.config.skip_clean));
        let mut state = SharedContext::new(
            Arc::clone(&self.config),
            self.providers.clone(),
            Arc::clone(&self.reporter),
            artifact,
        );

        runner.run(cancel, &mut state).await;

        let registered = state.template().cloned();
        let cleanup_failures = state.cleanup_failures().len();

        match state.into_outcome() {
            Ok(template) => {
                info!(
                    template_id = %template.id,
                    zone = %template.zone,
                    artifact_id = %template.artifact_id(),
                    "import complete"
                );
                Ok(template)
            }
            Err(e) => {
                if let Some(template) = registered {
                    warn!(
                        template_id = %template.id,
                        zone = %template.zone,
                        "import failed after the template was registered; template kept"
                    );
                    self.reporter.error(&format!(
                        "{template} was registered and has not been removed"
                    ));
                }
                if cleanup_failures > 0 {
                    warn!(cleanup_failures, "rollback left remote state behind");
                }
                warn!(error = %e, "import failed");
                Err(e)
            }
        }
    }

    /// Delete a template produced by an earlier import.
    pub async fn destroy(&self, template: &Template) -> ImportResult<()> {
        self.reporter
            .say(&format!("Deleting template {} in zone {}", template.id, template.zone));

        self.providers
            .compute
            .delete_template(&template.zone, &template.id)
            .await?;

        info!(template_id = %template.id, zone = %template.zone, "template deleted");
        Ok(())
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("zone", &self.config.zone)
            .field("skip_clean", &self.config.skip_clean)
            .finish_non_exhaustive()
    }
}
