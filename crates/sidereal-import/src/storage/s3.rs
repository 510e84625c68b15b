//! S3-compatible storage client.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult};
use crate::types::ObjectRef;

use super::{remove_object, stream_file, DeleteOutcome, ObjectStorage, UploadReceipt};

/// Storage client for S3-compatible services, using path-style addressing.
pub struct S3Storage {
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: SecretString,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3Storage {
    /// Create a new storage client.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: SecretString,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Create a storage client from import configuration.
    ///
    /// The API credentials double as storage credentials and the zone is
    /// used as the signing region.
    #[must_use]
    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(
            config.storage_endpoint(),
            config.zone.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
        )
    }

    /// Get or build the store addressing `bucket`.
    fn store(&self, bucket: &str) -> ImportResult<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store = AmazonS3Builder::new()
            .with_endpoint(&self.endpoint)
            .with_bucket_name(bucket)
            .with_region(&self.region)
            .with_access_key_id(&self.access_key_id)
            .with_secret_access_key(self.secret_access_key.expose_secret())
            .with_virtual_hosted_style_request(false)
            .with_allow_http(self.endpoint.starts_with("http://"))
            .build()
            .map_err(|e| ImportError::storage(format!("failed to create S3 client: {e}")))?;

        debug!(endpoint = %self.endpoint, bucket = %bucket, region = %self.region, "S3 client created");

        let store: Arc<dyn ObjectStore> = Arc::new(store);
        stores.insert(bucket.to_owned(), Arc::clone(&store));
        Ok(store)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(
        &self,
        object: &ObjectRef,
        source: &Path,
        cancel: &CancellationToken,
    ) -> ImportResult<UploadReceipt> {
        let store = self.store(&object.bucket)?;
        debug!(src = %source.display(), object = %object, "uploading to S3");

        let receipt = stream_file(store.as_ref(), object, source, cancel).await?;

        info!(
            object = %object,
            size = receipt.size,
            url = %self.object_url(object),
            "uploaded to S3"
        );
        Ok(receipt)
    }

    async fn delete(&self, object: &ObjectRef) -> ImportResult<DeleteOutcome> {
        let store = self.store(&object.bucket)?;
        remove_object(store.as_ref(), object).await
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("{}/{}/{}", self.endpoint, object.bucket, object.key)
    }
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
