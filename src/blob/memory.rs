use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::blob::{BlobStore, StagedBlob, StoredBlob};
use crate::locks::hold;
use crate::model::error::blob_errors::BlobError;

/// blob store that keeps everything in memory. Can be told to fail every read, to simulate the disk going away
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    staged: Mutex<HashMap<String, Vec<u8>>>,
    next_staging_key: AtomicU64,
    fail_reads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, handle: &str) -> bool {
        hold(&self.blobs).contains_key(handle)
    }

    pub fn len(&self) -> usize {
        hold(&self.blobs).len()
    }
}

#[rocket::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn stage(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<StagedBlob, BlobError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let handle = format!("{:x}", Sha256::digest(&bytes));
        let size = bytes.len() as u64;
        let staging_key = self.next_staging_key.fetch_add(1, Ordering::SeqCst).to_string();
        hold(&self.staged).insert(staging_key.clone(), bytes);
        Ok(StagedBlob {
            handle,
            size,
            staging_key,
        })
    }

    async fn commit(&self, staged: StagedBlob) -> Result<StoredBlob, BlobError> {
        let bytes = hold(&self.staged)
            .remove(&staged.staging_key)
            .ok_or(BlobError::NotFound)?;
        hold(&self.blobs).entry(staged.handle.clone()).or_insert(bytes);
        Ok(StoredBlob {
            handle: staged.handle,
            size: staged.size,
        })
    }

    async fn open(&self, handle: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>, BlobError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BlobError::Io("reads are turned off".to_string()));
        }
        let bytes = hold(&self.blobs)
            .get(handle)
            .cloned()
            .ok_or(BlobError::NotFound)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn delete(&self, handle: &str) -> Result<(), BlobError> {
        hold(&self.blobs)
            .remove(handle)
            .map(|_| ())
            .ok_or(BlobError::NotFound)
    }
}
