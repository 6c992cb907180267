use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::blob::{BlobStore, StagedBlob, StoredBlob};
use crate::model::error::blob_errors::BlobError;

//language=RegExp
static HANDLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[0-9a-f]{64}$").expect("valid regex"));

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

const CHUNK_SIZE: usize = 64 * 1024;

/// Content-addressed blobs on the local disk. A blob's handle is the sha256 of its bytes,
/// and it lives at `<root>/<first 2 chars of handle>/<handle>`
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// creates the blob directory (and its temp directory) if needed, and clears out temp files
    /// left behind by uploads that were interrupted
    pub async fn initialize(&self) -> Result<(), BlobError> {
        let temp_dir = self.temp_dir();
        if fs::try_exists(&temp_dir).await? {
            fs::remove_dir_all(&temp_dir).await?;
        }
        fs::create_dir_all(&temp_dir).await?;
        Ok(())
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn path_for(&self, handle: &str) -> Result<PathBuf, BlobError> {
        if !HANDLE_REGEX.is_match(handle) {
            return Err(BlobError::InvalidHandle);
        }
        Ok(self.root.join(&handle[..2]).join(handle))
    }

    /// hashes `reader` into the temp file at `temp_path`, returning the digest and byte count
    async fn write_temp(
        temp_path: &Path,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(String, u64), BlobError> {
        let mut file = fs::File::create(temp_path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut size: u64 = 0;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            file.write_all(&buffer[..read]).await?;
            size += read as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((format!("{:x}", hasher.finalize()), size))
    }
}

#[rocket::async_trait]
impl BlobStore for DiskBlobStore {
    async fn stage(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<StagedBlob, BlobError> {
        let staging_key = format!(
            "{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let temp_path = self.temp_dir().join(&staging_key);
        match Self::write_temp(&temp_path, reader).await {
            Ok((handle, size)) => Ok(StagedBlob {
                handle,
                size,
                staging_key,
            }),
            Err(e) => {
                fs::remove_file(&temp_path).await.unwrap_or(());
                Err(e)
            }
        }
    }

    async fn commit(&self, staged: StagedBlob) -> Result<StoredBlob, BlobError> {
        let temp_path = self.temp_dir().join(&staged.staging_key);
        let destination = self.path_for(&staged.handle)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::try_exists(&destination).await? {
            // same bytes are already stored
            fs::remove_file(&temp_path).await?;
        } else {
            fs::rename(&temp_path, &destination).await?;
        }
        Ok(StoredBlob {
            handle: staged.handle,
            size: staged.size,
        })
    }

    async fn open(&self, handle: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>, BlobError> {
        let path = self.path_for(handle)?;
        let file = fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn delete(&self, handle: &str) -> Result<(), BlobError> {
        let path = self.path_for(handle)?;
        fs::remove_file(path).await?;
        Ok(())
    }
}
