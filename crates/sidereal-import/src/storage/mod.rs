//! Object storage for temporary image uploads.
//!
//! Images are streamed to storage with a multipart upload so that large disk
//! images never have to be held in memory. Two implementations are provided:
//! [`S3Storage`] for S3-compatible services and [`MemoryStorage`] for tests.

mod memory;
mod s3;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

use std::path::Path;

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ImportError, ImportResult};
use crate::types::ObjectRef;

/// Size of the chunks read from disk and handed to the uploader.
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Maximum number of parts uploaded concurrently.
const MAX_CONCURRENT_PARTS: usize = 4;

/// Summary of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Number of bytes uploaded.
    pub size: u64,
    /// Hex-encoded MD5 of the uploaded bytes, as the compute API expects.
    pub checksum: String,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and was removed.
    Deleted,
    /// The object was already absent.
    NotFound,
}

/// Storage capability used by the import steps.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stream a local file to `object`.
    ///
    /// Returns [`ImportError::Cancelled`] if `cancel` fires before the upload
    /// completes; any partial upload is aborted.
    async fn put(
        &self,
        object: &ObjectRef,
        source: &Path,
        cancel: &CancellationToken,
    ) -> ImportResult<UploadReceipt>;

    /// Delete `object`. A missing object is reported, not treated as an error.
    async fn delete(&self, object: &ObjectRef) -> ImportResult<DeleteOutcome>;

    /// URL the compute provider uses to fetch `object`.
    fn object_url(&self, object: &ObjectRef) -> String;
}

fn object_path(object: &ObjectRef) -> ImportResult<ObjectPath> {
    ObjectPath::parse(&object.key)
        .map_err(|e| ImportError::storage(format!("invalid object key {:?}: {e}", object.key)))
}

/// Stream `source` into `store` as a multipart upload.
async fn stream_file(
    store: &dyn ObjectStore,
    object: &ObjectRef,
    source: &Path,
    cancel: &CancellationToken,
) -> ImportResult<UploadReceipt> {
    let location = object_path(object)?;
    let mut file = tokio::fs::File::open(source).await?;

    let upload = store
        .put_multipart(&location)
        .await
        .map_err(|e| ImportError::storage(format!("failed to start upload of {object}: {e}")))?;
    let mut writer = WriteMultipart::new_with_chunk_size(upload, CHUNK_SIZE);

    let mut hasher = Md5::new();
    let mut size: u64 = 0;
    let mut buf = vec![0_u8; CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            read = file.read(&mut buf) => Some(read),
        };

        let read = match read {
            Some(Ok(read)) => read,
            Some(Err(e)) => {
                abort_upload(writer, object).await;
                return Err(e.into());
            }
            None => {
                abort_upload(writer, object).await;
                return Err(ImportError::Cancelled);
            }
        };

        if read == 0 {
            break;
        }

        let chunk = &buf[..read];
        hasher.update(chunk);
        writer.write(chunk);
        size += read as u64;

        let capacity = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = writer.wait_for_capacity(MAX_CONCURRENT_PARTS) => Some(result),
        };
        match capacity {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                abort_upload(writer, object).await;
                return Err(ImportError::storage(format!(
                    "failed to upload {object}: {e}"
                )));
            }
            None => {
                abort_upload(writer, object).await;
                return Err(ImportError::Cancelled);
            }
        }
    }

    // Drain in-flight parts while cancellation can still abort the upload.
    let drained = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = writer.wait_for_capacity(0) => Some(result),
    };
    match drained {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            abort_upload(writer, object).await;
            return Err(ImportError::storage(format!("failed to upload {object}: {e}")));
        }
        None => {
            abort_upload(writer, object).await;
            return Err(ImportError::Cancelled);
        }
    }

    writer
        .finish()
        .await
        .map_err(|e| ImportError::storage(format!("failed to complete upload of {object}: {e}")))?;

    let checksum = hex::encode(hasher.finalize());
    debug!(object = %object, size, checksum = %checksum, "upload complete");

    Ok(UploadReceipt { size, checksum })
}

async fn abort_upload(writer: WriteMultipart, object: &ObjectRef) {
    if let Err(e) = writer.abort().await {
        warn!(object = %object, error = %e, "failed to abort partial upload");
    }
}

/// Delete `object` from `store`, reporting whether it was present.
async fn remove_object(store: &dyn ObjectStore, object: &ObjectRef) -> ImportResult<DeleteOutcome> {
    let location = object_path(object)?;

    // Most S3 services acknowledge deletes of missing keys, so check first.
    match store.head(&location).await {
        Ok(_) => {}
        Err(object_store::Error::NotFound { .. }) => return Ok(DeleteOutcome::NotFound),
        Err(e) => {
            return Err(ImportError::storage(format!(
                "failed to look up {object}: {e}"
            )))
        }
    }

    match store.delete(&location).await {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(object_store::Error::NotFound { .. }) => Ok(DeleteOutcome::NotFound),
        Err(e) => Err(ImportError::storage(format!(
            "failed to delete {object}: {e}"
        ))),
    }
}
