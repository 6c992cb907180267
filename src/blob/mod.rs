use tokio::io::AsyncRead;

use crate::model::error::blob_errors::BlobError;

mod disk;
#[cfg(test)]
mod memory;

pub use disk::DiskBlobStore;
#[cfg(test)]
pub use memory::MemoryBlobStore;

/// where a blob ended up after [`BlobStore::commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// opaque reference to pass back into [`BlobStore::open`] and [`BlobStore::delete`]
    pub handle: String,
    /// how many bytes were actually stored
    pub size: u64,
}

/// Bytes that have been fully received and hashed, but can't be opened yet.
/// The handle is already known, so callers can lock it before [`BlobStore::commit`] makes the bytes visible
#[derive(Debug, PartialEq, Eq)]
pub struct StagedBlob {
    pub handle: String,
    pub size: u64,
    /// where the store parked the bytes
    staging_key: String,
}

/// Binary storage for file contents. Bytes are streamed in both directions and never transformed.
///
/// Identical content shares a handle, so callers must check nothing else references a handle before deleting it,
/// and must hold the handle's [`crate::locks::BlobLocks`] entry from commit until the reference is recorded
#[rocket::async_trait]
pub trait BlobStore: Send + Sync {
    /// receives every byte of `reader` without making it visible under its handle yet
    async fn stage(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<StagedBlob, BlobError>;

    /// makes staged bytes openable under their handle. If the handle already exists, the staged copy is dropped
    async fn commit(&self, staged: StagedBlob) -> Result<StoredBlob, BlobError>;

    async fn open(&self, handle: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>, BlobError>;

    async fn delete(&self, handle: &str) -> Result<(), BlobError>;

    async fn put(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<StoredBlob, BlobError> {
        let staged = self.stage(reader).await?;
        self.commit(staged).await
    }
}
