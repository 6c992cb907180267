use std::backtrace::Backtrace;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use crate::blob::BlobStore;
use crate::model::error::processing_errors::PipelineError;
use crate::model::node_types::ProcessStatus;
use crate::model::repository::{FileAttributes, Node, NodeKind};
use crate::processing::client::ProcessingClient;
use crate::processing::models::{truncate_summary, ProcessOutcome, ProcessingRequest};
use crate::repository::{node_repository, Database};

/// Runs one file through content processing. Cheap to clone, and every worker gets its own copy
#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    client: Arc<dyn ProcessingClient>,
}

impl Pipeline {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>, client: Arc<dyn ProcessingClient>) -> Self {
        Self { db, blobs, client }
    }

    /// Processes the file with the passed id. The file must already have been claimed for `run`
    /// by whoever dispatched the job. A job whose run no longer holds the claim (a redelivered message
    /// from before a restart, say) is skipped.
    ///
    /// Nothing is returned to whoever triggered the job. Failures are recorded as
    /// `processStatus = failed` and logged, and a run never retries on its own
    pub async fn run(&self, file_id: u32, run: u32) -> ProcessOutcome {
        let (node, file) = match self.load_claimed_file(file_id, run) {
            Some(found) => found,
            None => return ProcessOutcome::Skipped,
        };
        log::info!("Processing file {file_id} ({})", node.name);
        let result = match self.process(&node, &file).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Processing failed for file {file_id}: {e:?}");
                self.mark_failed(file_id, run);
                return ProcessOutcome::Failed;
            }
        };
        let content = result.content.unwrap_or_default();
        let summary = result.summary.unwrap_or_default();
        let new_vector = result.vector_id.as_deref().filter(|v| !v.is_empty());
        let stored = self.db.open_connection().and_then(|con| {
            node_repository::complete_processing(
                file_id,
                run,
                &content,
                truncate_summary(&summary),
                new_vector,
                &con,
            )
        });
        match stored {
            Ok(true) => {}
            Ok(false) => {
                // deleted, or claimed by a newer run, while the service was working on it
                log::warn!("Run {run} of file {file_id} lost its claim before its results came back");
                if let Some(vector) = new_vector {
                    if !self.is_stored_vector(file_id, vector) {
                        self.delete_vector(vector).await;
                    }
                }
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                log::error!(
                    "Failed to store processing results for file {file_id}. Exception is {e:?}\n{}",
                    Backtrace::force_capture()
                );
                self.mark_failed(file_id, run);
                return ProcessOutcome::Failed;
            }
        }
        // a reprocess replaces the old index entry, so the old one would be orphaned
        if let (Some(old), Some(new)) = (file.vector_id.as_deref(), new_vector) {
            if old != new {
                self.delete_vector(old).await;
            }
        }
        log::info!("Finished processing file {file_id}");
        ProcessOutcome::Completed
    }

    /// removes a vector index entry, logging instead of failing
    pub async fn delete_vector(&self, vector_id: &str) {
        if let Err(e) = self.client.delete_vector(vector_id).await {
            log::warn!("Failed to delete vector {vector_id}: {e:?}");
        }
    }

    /// whether `vector_id` is the one the file currently points at. Errs on the side of keeping the vector
    fn is_stored_vector(&self, file_id: u32, vector_id: &str) -> bool {
        match self
            .db
            .open_connection()
            .and_then(|con| node_repository::find_by_id(file_id, &con))
        {
            Ok(Some(node)) => node
                .as_file()
                .and_then(|file| file.vector_id.as_deref())
                .is_some_and(|stored| stored == vector_id),
            Ok(None) => false,
            Err(e) => {
                log::error!("Failed to load file {file_id}. Exception is {e:?}");
                true
            }
        }
    }

    fn load_claimed_file(&self, file_id: u32, run: u32) -> Option<(Node, FileAttributes)> {
        let node = match self
            .db
            .open_connection()
            .and_then(|con| node_repository::find_by_id(file_id, &con))
        {
            Ok(Some(node)) => node,
            Ok(None) => {
                log::warn!("Not processing file {file_id} because it no longer exists");
                return None;
            }
            Err(e) => {
                log::error!(
                    "Failed to load file {file_id} for processing. Exception is {e:?}\n{}",
                    Backtrace::force_capture()
                );
                self.mark_failed(file_id, run);
                return None;
            }
        };
        let file = match &node.kind {
            NodeKind::File(file) => file.clone(),
            NodeKind::Folder(_) => {
                log::warn!("Not processing node {file_id} because it is a folder");
                return None;
            }
        };
        if file.process_status != ProcessStatus::Processing {
            log::warn!(
                "Not processing file {file_id} because its status is {} instead of processing",
                file.process_status
            );
            return None;
        }
        match self
            .db
            .open_connection()
            .and_then(|con| node_repository::get_process_run(file_id, &con))
        {
            Ok(Some(current)) if current == run => {}
            Ok(current) => {
                log::warn!("Not processing file {file_id} because run {run} was replaced by {current:?}");
                return None;
            }
            Err(e) => {
                log::error!(
                    "Failed to check the processing run of file {file_id}. Exception is {e:?}\n{}",
                    Backtrace::force_capture()
                );
                return None;
            }
        }
        Some((node, file))
    }

    async fn process(
        &self,
        node: &Node,
        file: &FileAttributes,
    ) -> Result<crate::processing::models::ProcessingResult, PipelineError> {
        let mut reader = self
            .blobs
            .open(&file.storage_handle)
            .await
            .map_err(|e| PipelineError::BlobRead(e.to_string()))?;
        let mut bytes = Vec::with_capacity(file.size as usize);
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| PipelineError::BlobRead(e.to_string()))?;
        self.client
            .process(ProcessingRequest {
                file_id: node.id,
                filename: node.name.clone(),
                mime_type: file.mime_type.clone(),
                bytes,
            })
            .await
    }

    fn mark_failed(&self, file_id: u32, run: u32) {
        let res = self
            .db
            .open_connection()
            .and_then(|con| node_repository::fail_processing(file_id, run, &con));
        if let Err(e) = res {
            log::error!(
                "Failed to mark file {file_id} as failed. Exception is {e:?}\n{}",
                Backtrace::force_capture()
            );
        }
    }
}

/// Puts every file a crash left in `processing` back to `pending` and returns their ids, so they can be
/// dispatched again. Must run before any worker starts
pub fn release_interrupted(db: &Database) -> Result<Vec<u32>, rusqlite::Error> {
    let con = db.open_connection()?;
    let ids = node_repository::release_interrupted_processing(&con)?;
    if !ids.is_empty() {
        log::warn!(
            "{} file(s) were still processing when the server stopped, re-queueing them",
            ids.len()
        );
    }
    Ok(ids)
}
