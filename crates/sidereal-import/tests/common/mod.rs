//! Common test utilities for import integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use sidereal_import::compute::{OperationHandle, OperationStatus, TemplateRequest};
use sidereal_import::{
    Artifact, ComputeProvider, ImportConfig, ImportResult, Importer, MemoryCompute, MemoryStorage,
    ProviderHandles, Producer, RegistrationConfig, StorageConfig, TemplateConfig, TemplateId,
    TracingReporter,
};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

/// Configuration matching the reference scenario.
pub fn config() -> ImportConfig {
    ImportConfig {
        api_key: "EXOkey".to_owned(),
        api_secret: SecretString::from("secret".to_owned()),
        zone: "ch-gva-2".to_owned(),
        storage: StorageConfig {
            bucket: "tmp".to_owned(),
            key_prefix: "imports/".to_owned(),
            ..StorageConfig::default()
        },
        template: TemplateConfig {
            name: "my-template".to_owned(),
            ..TemplateConfig::default()
        },
        registration: RegistrationConfig {
            poll_interval_ms: 10,
            timeout_secs: 5,
            ..RegistrationConfig::default()
        },
        ..ImportConfig::default()
    }
}

/// A disk image on disk named `disk.img`.
pub struct TestImage {
    _dir: tempfile::TempDir,
    file: NamedTempFile,
}

impl TestImage {
    pub fn new(contents: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::Builder::new()
            .prefix("disk")
            .suffix(".img")
            .tempfile_in(dir.path())
            .unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        Self { _dir: dir, file }
    }

    pub fn artifact(&self) -> Artifact {
        Artifact::image(Producer::File, self.file.path())
    }
}

/// Importer wired to in-memory providers.
pub struct TestImport {
    pub compute: Arc<MemoryCompute>,
    pub storage: Arc<MemoryStorage>,
    pub importer: Importer,
}

impl TestImport {
    pub fn new(compute: MemoryCompute) -> Self {
        Self::with_config(compute, config())
    }

    pub fn with_config(compute: MemoryCompute, config: ImportConfig) -> Self {
        let compute = Arc::new(compute);
        let storage = Arc::new(MemoryStorage::new());
        let importer = Importer::new(
            config,
            ProviderHandles::new(compute.clone(), storage.clone()),
            Arc::new(TracingReporter::default()),
        );

        Self {
            compute,
            storage,
            importer,
        }
    }

    /// Objects left in the `tmp` bucket.
    pub async fn objects_left(&self) -> usize {
        self.storage.object_count("tmp").await
    }
}

/// Compute provider that cancels the run as soon as registration is
/// submitted, then behaves like the wrapped provider.
pub struct CancellingCompute {
    pub inner: Arc<MemoryCompute>,
    pub cancel: CancellationToken,
}

#[async_trait]
impl ComputeProvider for CancellingCompute {
    async fn create_template(&self, request: &TemplateRequest) -> ImportResult<OperationHandle> {
        let handle = self.inner.create_template(request).await?;
        self.cancel.cancel();
        Ok(handle)
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> ImportResult<OperationStatus> {
        self.inner.poll_operation(handle).await
    }

    async fn delete_template(&self, zone: &str, id: &TemplateId) -> ImportResult<()> {
        self.inner.delete_template(zone, id).await
    }
}
