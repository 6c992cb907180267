use std::collections::HashSet;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::model::api::ReconcileApi;
use crate::model::error::node_errors::AggregateError;
use crate::model::node_types::NodeType;
use crate::model::repository::{ChildAggregate, FolderMetadata};
use crate::repository::node_repository;
use crate::service::{log_db_error, now};

/// no legitimate tree is deeper than this. Walking further means the parent chain loops
pub const MAX_TREE_DEPTH: u32 = 256;

/// sums a folder's direct children into its aggregate. Child folders contribute their own cached aggregate
pub fn aggregate_children(children: &[ChildAggregate], modified: NaiveDateTime) -> FolderMetadata {
    children.iter().fold(
        FolderMetadata {
            file_count: 0,
            total_size: 0,
            last_modified: Some(modified),
        },
        |mut acc, child| {
            match child.node_type {
                NodeType::File => {
                    acc.file_count += 1;
                    acc.total_size += child.size;
                }
                NodeType::Folder => {
                    acc.file_count += child.file_count;
                    acc.total_size += child.total_size;
                }
            }
            acc
        },
    )
}

/// rebuilds one folder's aggregate from its direct children and stores it
pub fn recompute_folder(
    folder_id: u32,
    modified: NaiveDateTime,
    con: &Connection,
) -> Result<FolderMetadata, rusqlite::Error> {
    let children = node_repository::get_child_aggregates(folder_id, con)?;
    let metadata = aggregate_children(&children, modified);
    node_repository::update_folder_metadata(folder_id, &metadata, con)?;
    Ok(metadata)
}

/// Recomputes `folder_id` and then every folder above it, up to the root of the tree.
/// Each folder relies on its children already being correct, so the walk goes bottom-up.
///
/// Returns how many folders were recomputed. `None` (the root) recomputes nothing
pub fn recompute_path(folder_id: Option<u32>, con: &Connection) -> Result<u32, AggregateError> {
    let modified = now();
    let mut visited: HashSet<u32> = HashSet::new();
    let mut current = folder_id;
    while let Some(id) = current {
        if !visited.insert(id) || visited.len() > MAX_TREE_DEPTH as usize {
            log::error!("Parent chain starting at folder {folder_id:?} loops through folder {id}");
            return Err(AggregateError::CorruptParentChain);
        }
        recompute_folder(id, modified, con).map_err(|e| {
            log_db_error(&format!("recompute aggregate for folder {id}"), &e);
            AggregateError::DbFailure
        })?;
        current = node_repository::get_parent_id(id, con).map_err(|e| {
            log_db_error(&format!("retrieve parent of folder {id}"), &e);
            AggregateError::DbFailure
        })?;
    }
    Ok(visited.len() as u32)
}

/// [`recompute_path`], but failures are only logged. Used after structural changes, which have
/// already happened by the time this runs and shouldn't be reported as failed because of a stale cache.
/// [`reconcile_evidence`] repairs whatever this couldn't
pub fn propagate(folder_id: Option<u32>, con: &Connection) {
    if let Err(e) = recompute_path(folder_id, con) {
        log::warn!(
            "Folder aggregates above {folder_id:?} may be stale ({e:?}). Run a reconcile to repair them"
        );
    }
}

/// Rebuilds every folder aggregate in the evidence tree from scratch, deepest folders first so each
/// folder sees already-repaired children. Only folders whose counts were wrong are written.
///
/// Fails with [`AggregateError::CorruptParentChain`] after repairing what it could if some folders
/// aren't reachable from the root
pub fn reconcile_evidence(evidence_id: u32, con: &Connection) -> Result<ReconcileApi, AggregateError> {
    let modified = now();
    let folder_ids = node_repository::get_folder_ids_deepest_first(evidence_id, MAX_TREE_DEPTH, con)
        .map_err(|e| {
            log_db_error(&format!("list folders of evidence {evidence_id}"), &e);
            AggregateError::DbFailure
        })?;
    let mut repaired = 0;
    for id in &folder_ids {
        let stored = node_repository::get_by_id(*id, con).map_err(|e| {
            log_db_error(&format!("retrieve folder {id}"), &e);
            AggregateError::DbFailure
        })?;
        let children = node_repository::get_child_aggregates(*id, con).map_err(|e| {
            log_db_error(&format!("retrieve children of folder {id}"), &e);
            AggregateError::DbFailure
        })?;
        let fresh = aggregate_children(&children, modified);
        let stale = match stored.as_folder() {
            Some(current) => {
                current.file_count != fresh.file_count || current.total_size != fresh.total_size
            }
            None => false,
        };
        if stale {
            node_repository::update_folder_metadata(*id, &fresh, con).map_err(|e| {
                log_db_error(&format!("repair aggregate for folder {id}"), &e);
                AggregateError::DbFailure
            })?;
            repaired += 1;
        }
    }
    log::info!(
        "Reconciled evidence {evidence_id}: {} folder(s) checked, {repaired} repaired",
        folder_ids.len()
    );
    // folders stuck in a parent loop can't be reached from the root, so the walk above never saw them
    let total_folders = node_repository::get_statistics(evidence_id, con)
        .map_err(|e| {
            log_db_error(&format!("count folders of evidence {evidence_id}"), &e);
            AggregateError::DbFailure
        })?
        .total_folders;
    if total_folders > folder_ids.len() as u64 {
        log::error!(
            "Evidence {evidence_id} has {} folder(s) that can't be reached from the root",
            total_folders - folder_ids.len() as u64
        );
        return Err(AggregateError::CorruptParentChain);
    }
    Ok(ReconcileApi {
        folders_checked: folder_ids.len() as u32,
        folders_repaired: repaired,
    })
}
