//! Upload the disk image to object storage.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ImportError, ImportResult};
use crate::state::SharedContext;
use crate::step::{Step, StepAction};
use crate::storage::DeleteOutcome;
use crate::types::{ObjectRef, UploadedObject};

/// Streams the artifact's image into the configured bucket.
///
/// Rolling back removes the uploaded object.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadStep;

impl UploadStep {
    async fn upload(cancel: &CancellationToken, state: &SharedContext) -> ImportResult<UploadedObject> {
        let source = state.artifact().image_path()?.to_path_buf();
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ImportError::config(format!("image path {} has no file name", source.display()))
            })?;

        let storage = &state.config().storage;
        let object = ObjectRef::generate(&storage.bucket, &storage.key_prefix, file_name);

        state
            .reporter()
            .say(&format!("Uploading {} to {object}", source.display()));

        let store = Arc::clone(&state.providers().storage);
        let receipt = store.put(&object, &source, cancel).await?;
        let url = store.object_url(&object);

        info!(
            bucket = %object.bucket,
            key = %object.key,
            size = receipt.size,
            "image uploaded"
        );

        Ok(UploadedObject {
            object,
            size: receipt.size,
            checksum: receipt.checksum,
            url,
        })
    }
}

#[async_trait]
impl Step for UploadStep {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) -> StepAction {
        let result = Self::upload(cancel, state).await;
        match result {
            Ok(uploaded) => {
                state.set_uploaded_object(uploaded);
                StepAction::Continue
            }
            Err(e) => {
                if !e.is_cancelled() {
                    state.reporter().error(&format!("Upload failed: {e}"));
                }
                state.fail(e);
                StepAction::Halt
            }
        }
    }

    async fn cleanup(&self, state: &mut SharedContext) -> ImportResult<()> {
        let Some(uploaded) = state.uploaded_object() else {
            return Ok(());
        };

        let object = uploaded.object.clone();
        let store = Arc::clone(&state.providers().storage);

        match store.delete(&object).await? {
            DeleteOutcome::Deleted => {
                state
                    .reporter()
                    .say(&format!("Removed uploaded image {object}"));
            }
            DeleteOutcome::NotFound => {
                debug!(object = %object, "uploaded image already absent");
            }
        }
        Ok(())
    }
}
