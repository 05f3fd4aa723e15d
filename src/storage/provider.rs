use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Readable blob content handed to the download path
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Location and size of a freshly written blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Path recorded in metadata and used to open the blob later
    pub path: String,
    pub size: u64,
}

/// Blob storage backend
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stream `reader` into a new blob called `name`.
    ///
    /// Fails with `file_too_large` once more than `max_size` bytes arrive; the
    /// partial blob is removed in that case and on any other failure.
    async fn put_reader(
        &self,
        name: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_size: u64,
    ) -> Result<StoredBlob>;

    /// Open a blob for reading; `AppError::BlobMissing` if it no longer exists
    async fn open(&self, path: &str) -> Result<BlobReader>;

    /// Delete a blob; deleting a missing blob is not an error
    async fn delete(&self, path: &str) -> Result<()>;
}
