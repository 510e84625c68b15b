//! In-memory storage for tests and dry runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ImportError, ImportResult};
use crate::types::ObjectRef;

use super::{remove_object, stream_file, DeleteOutcome, ObjectStorage, UploadReceipt};

/// Storage backed by one [`InMemory`] store per bucket.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<HashMap<String, Arc<InMemory>>>,
    deny_deletes: AtomicBool,
    deleted: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delete fail with a permission error.
    pub fn deny_deletes(&self, deny: bool) {
        self.deny_deletes.store(deny, Ordering::SeqCst);
    }

    /// Number of objects actually removed so far.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Check whether `object` is currently stored.
    pub async fn contains(&self, object: &ObjectRef) -> bool {
        let Ok(location) = ObjectPath::parse(&object.key) else {
            return false;
        };
        self.bucket(&object.bucket).head(&location).await.is_ok()
    }

    /// Number of objects stored in `bucket`.
    pub async fn object_count(&self, bucket: &str) -> usize {
        use futures::StreamExt;

        self.bucket(bucket)
            .list(None)
            .filter(|meta| std::future::ready(meta.is_ok()))
            .count()
            .await
    }

    fn bucket(&self, bucket: &str) -> Arc<InMemory> {
        let mut buckets = self.buckets.lock();
        Arc::clone(
            buckets
                .entry(bucket.to_owned())
                .or_insert_with(|| Arc::new(InMemory::new())),
        )
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(
        &self,
        object: &ObjectRef,
        source: &Path,
        cancel: &CancellationToken,
    ) -> ImportResult<UploadReceipt> {
        let store = self.bucket(&object.bucket);
        stream_file(store.as_ref(), object, source, cancel).await
    }

    async fn delete(&self, object: &ObjectRef) -> ImportResult<DeleteOutcome> {
        if self.deny_deletes.load(Ordering::SeqCst) {
            return Err(ImportError::storage(format!(
                "failed to delete {object}: access denied"
            )));
        }

        let store = self.bucket(&object.bucket);
        let outcome = remove_object(store.as_ref(), object).await?;
        if outcome == DeleteOutcome::Deleted {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("memory://{}/{}", object.bucket, object.key)
    }
}
