use std::sync::Arc;

use crate::blob::BlobStore;
use crate::locks::{BlobLocks, TreeLocks};
use crate::processing::client::ProcessingClient;
use crate::processing::Pipeline;
use crate::queue::ProcessingQueue;
use crate::repository::Database;

/// Every resource the services need, built once at startup and handed to rocket as managed state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub blobs: Arc<dyn BlobStore>,
    pub locks: Arc<TreeLocks>,
    pub blob_locks: Arc<BlobLocks>,
    pub queue: Arc<ProcessingQueue>,
    pub processing: Arc<dyn ProcessingClient>,
}

impl AppState {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        queue: ProcessingQueue,
        processing: Arc<dyn ProcessingClient>,
    ) -> Self {
        Self {
            db,
            blobs,
            locks: Arc::new(TreeLocks::new()),
            blob_locks: Arc::new(BlobLocks::new()),
            queue: Arc::new(queue),
            processing,
        }
    }

    /// a pipeline sharing this state's database, blobs, and processing client
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.db.clone(), self.blobs.clone(), self.processing.clone())
    }
}
