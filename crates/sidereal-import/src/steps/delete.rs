//! Remove the temporary object once the template holds its own copy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ImportError;
use crate::state::SharedContext;
use crate::step::{Step, StepAction};
use crate::storage::DeleteOutcome;

/// Deletes the uploaded image. An already absent object is success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteStep;

#[async_trait]
impl Step for DeleteStep {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn run(&self, cancel: &CancellationToken, state: &mut SharedContext) -> StepAction {
        let Some(uploaded) = state.uploaded_object() else {
            state.fail(ImportError::Inconsistent(
                "delete ran before an image was uploaded".to_owned(),
            ));
            return StepAction::Halt;
        };

        let object = uploaded.object.clone();
        let store = Arc::clone(&state.providers().storage);

        state
            .reporter()
            .say(&format!("Deleting temporary object {object}"));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ImportError::Cancelled),
            result = store.delete(&object) => result,
        };

        match result {
            Ok(DeleteOutcome::Deleted) => StepAction::Continue,
            Ok(DeleteOutcome::NotFound) => {
                debug!(object = %object, "temporary object already absent");
                StepAction::Continue
            }
            Err(e) => {
                if !e.is_cancelled() {
                    state
                        .reporter()
                        .error(&format!("Failed to delete temporary object: {e}"));
                }
                state.fail(e);
                StepAction::Halt
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use super::*;
    use crate::compute::MemoryCompute;
    use crate::config::{ImportConfig, StorageConfig};
    use crate::state::test_support::context;
    use crate::steps::UploadStep;
    use crate::storage::MemoryStorage;

    async fn uploaded(storage: &Arc<MemoryStorage>, image: &Path) -> SharedContext {
        let config = ImportConfig {
            storage: StorageConfig {
                bucket: "tmp".to_owned(),
                ..StorageConfig::default()
            },
            ..ImportConfig::default()
        };
        let mut state = context(
            config,
            Arc::new(MemoryCompute::succeeding("tmpl-123")),
            Arc::clone(storage),
            image,
        );
        let action = UploadStep.run(&CancellationToken::new(), &mut state).await;
        assert_eq!(action, StepAction::Continue);
        state
    }

    fn image() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"disk image bytes").unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn removes_uploaded_object() {
        let file = image();
        let storage = Arc::new(MemoryStorage::new());
        let mut state = uploaded(&storage, file.path()).await;

        let action = DeleteStep.run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Continue);
        assert_eq!(storage.object_count("tmp").await, 0);
        assert!(!state.is_stopped());
    }

    #[tokio::test]
    async fn deleting_twice_is_idempotent() {
        let file = image();
        let storage = Arc::new(MemoryStorage::new());
        let mut state = uploaded(&storage, file.path()).await;
        let cancel = CancellationToken::new();

        assert_eq!(DeleteStep.run(&cancel, &mut state).await, StepAction::Continue);
        assert_eq!(DeleteStep.run(&cancel, &mut state).await, StepAction::Continue);

        assert!(state.error().is_none());
        assert_eq!(storage.deleted_count(), 1);
    }

    #[tokio::test]
    async fn denied_delete_is_an_error() {
        let file = image();
        let storage = Arc::new(MemoryStorage::new());
        let mut state = uploaded(&storage, file.path()).await;
        storage.deny_deletes(true);

        let action = DeleteStep.run(&CancellationToken::new(), &mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(matches!(state.error(), Some(ImportError::Storage(_))));
        assert_eq!(storage.object_count("tmp").await, 1);
    }

    #[tokio::test]
    async fn cancellation_leaves_object_for_rollback() {
        let file = image();
        let storage = Arc::new(MemoryStorage::new());
        let mut state = uploaded(&storage, file.path()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let action = DeleteStep.run(&cancel, &mut state).await;

        assert_eq!(action, StepAction::Halt);
        assert!(state.is_cancelled());
        assert!(state.uploaded_object().is_some());
    }
}
