use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use tokio::io::AsyncRead;

use crate::guard::{Caller, Role};
use crate::locks::hold;
use crate::model::api::{NodeApi, TreeNodeApi, UploadApi};
use crate::model::error::node_errors::{
    CreateNodeError, DeleteNodeError, DownloadFileError, GetNodeError, UpdateNodeError,
};
use crate::model::repository::{Evidence, NewFile, NewFolder, Node, NodeKind, Review};
use crate::model::node_types::ApprovalStatus;
use crate::model::request::node_requests::{
    extension_of, sanitize_name, CreateFolderRequest, NewUpload, RenameNodeRequest,
};
use crate::repository::{evidence_repository, node_repository, Database};
use crate::service::evidence_service::refresh_status;
use crate::service::folder_metadata_service::{propagate, MAX_TREE_DEPTH};
use crate::service::{log_db_error, now};
use crate::state::AppState;

/// a node along with the evidence it belongs to, which decides who may act on it
pub fn get_node_scope(db: &Database, id: u32) -> Result<(Node, Evidence), GetNodeError> {
    let con = open(db).map_err(|_| GetNodeError::DbFailure)?;
    let node = find_node(id, &con)?;
    let evidence = evidence_repository::get_by_id(node.evidence_id, &con).map_err(|e| {
        log_db_error(&format!("retrieve evidence of node {id}"), &e);
        GetNodeError::DbFailure
    })?;
    Ok((node, evidence))
}

pub fn get_node(db: &Database, id: u32) -> Result<NodeApi, GetNodeError> {
    let con = open(db).map_err(|_| GetNodeError::DbFailure)?;
    find_node(id, &con).map(NodeApi::from)
}

/// creates an empty folder. Folder names must be unique among their sibling folders, ignoring case
pub fn create_folder(
    state: &AppState,
    evidence_id: u32,
    request: &CreateFolderRequest,
    created_by: u32,
) -> Result<NodeApi, CreateNodeError> {
    let name = sanitize_name(&request.name).ok_or(CreateNodeError::InvalidName)?;
    let tree = state.locks.for_tree(evidence_id);
    let _guard = hold(&tree);
    let con = open(&state.db).map_err(|_| CreateNodeError::DbFailure)?;
    check_destination(evidence_id, request.parent_id, &con)?;
    let duplicates = node_repository::count_sibling_folders_with_name(
        evidence_id,
        request.parent_id,
        &name,
        0,
        &con,
    )
    .map_err(|e| {
        log_db_error(&format!("check for duplicate folder {name}"), &e);
        CreateNodeError::DbFailure
    })?;
    if duplicates > 0 {
        return Err(CreateNodeError::AlreadyExists);
    }
    let folder = NewFolder {
        evidence_id,
        parent_id: request.parent_id,
        name,
        created_by,
        create_date: now(),
    };
    let created = node_repository::create_folder(&folder, &con)
        .and_then(|id| node_repository::get_by_id(id, &con))
        .map_err(|e| {
            log_db_error(&format!("create folder {}", folder.name), &e);
            CreateNodeError::DbFailure
        })?;
    propagate(request.parent_id, &con);
    log::info!("Created folder {} in evidence {evidence_id}", created.id);
    Ok(created.into())
}

/// Streams the uploaded bytes into the blob store, records the file in the evidence tree, and queues it for
/// content processing. Returns as soon as the job is queued, without waiting for processing to finish.
///
/// Files uploaded by an admin are approved right away, with the admin as the reviewer
pub async fn upload_file(
    state: &AppState,
    upload: NewUpload,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    caller: &Caller,
) -> Result<UploadApi, CreateNodeError> {
    let name = sanitize_name(&upload.name).ok_or(CreateNodeError::InvalidName)?;
    // checked before storing anything so a bad request doesn't cost a whole upload. Checked again once locked
    {
        let con = open(&state.db).map_err(|_| CreateNodeError::DbFailure)?;
        check_destination(upload.evidence_id, upload.parent_id, &con)?;
    }
    let staged = state.blobs.stage(reader).await.map_err(|e| {
        log::error!("Failed to store upload {name}. Exception is {e:?}");
        CreateNodeError::BlobFailure
    })?;
    // held until the row exists, so a delete of another file with the same bytes can't remove them in between
    let blob_guard = state.blob_locks.lock(&staged.handle).await;
    let stored = state.blobs.commit(staged).await.map_err(|e| {
        log::error!("Failed to store upload {name}. Exception is {e:?}");
        CreateNodeError::BlobFailure
    })?;
    let upload_date = now();
    let review = if caller.role == Role::Admin {
        Review {
            status: ApprovalStatus::Approved,
            reviewed_by: Some(caller.user_id),
            review_date: Some(upload_date),
            rejection_reason: None,
        }
    } else {
        Review::pending()
    };
    let new_file = NewFile {
        evidence_id: upload.evidence_id,
        parent_id: upload.parent_id,
        extension: extension_of(&name),
        name,
        uploaded_by: caller.user_id,
        upload_date,
        size: stored.size,
        mime_type: upload.mime_type,
        storage_handle: stored.handle,
        review,
    };
    let file_id = match insert_file(state, &new_file) {
        Ok(id) => id,
        Err(e) => {
            delete_unreferenced_blob(state, &new_file.storage_handle).await;
            return Err(e);
        }
    };
    drop(blob_guard);
    log::info!(
        "Stored file {file_id} ({}, {} bytes) in evidence {}",
        new_file.name,
        new_file.size,
        new_file.evidence_id
    );
    let job = match state.queue.dispatch(file_id).await {
        Ok(ticket) => Some(ticket),
        Err(e) => {
            // the upload itself worked, processing can be retried with a reprocess
            log::warn!("Failed to queue processing for file {file_id}: {e:?}");
            None
        }
    };
    let node = get_node(&state.db, file_id).map_err(|_| CreateNodeError::DbFailure)?;
    Ok(UploadApi { node, job })
}

fn insert_file(state: &AppState, file: &NewFile) -> Result<u32, CreateNodeError> {
    let tree = state.locks.for_tree(file.evidence_id);
    let _guard = hold(&tree);
    let con = open(&state.db).map_err(|_| CreateNodeError::DbFailure)?;
    check_destination(file.evidence_id, file.parent_id, &con)?;
    let id = node_repository::create_file(file, &con).map_err(|e| {
        log_db_error(&format!("create file {}", file.name), &e);
        CreateNodeError::DbFailure
    })?;
    propagate(file.parent_id, &con);
    refresh_status(file.evidence_id, &con);
    Ok(id)
}

/// Deletes a file, or a folder with no children.
///
/// A deleted file's blob is removed once nothing else references it, and its vector index entry is removed too.
/// Neither cleanup can fail the delete
pub async fn delete_node(state: &AppState, id: u32) -> Result<(), DeleteNodeError> {
    let deleted = remove_node(state, id)?;
    if let NodeKind::File(file) = deleted.kind {
        release_blob(state, &file.storage_handle).await;
        if let Some(vector_id) = file.vector_id {
            if let Err(e) = state.processing.delete_vector(&vector_id).await {
                log::warn!("Failed to delete vector {vector_id} for deleted file {id}: {e:?}");
            }
        }
    }
    Ok(())
}

fn remove_node(state: &AppState, id: u32) -> Result<Node, DeleteNodeError> {
    let evidence_id = {
        let con = open(&state.db).map_err(|_| DeleteNodeError::DbFailure)?;
        match find_node(id, &con) {
            Ok(node) => node.evidence_id,
            Err(GetNodeError::NotFound) => return Err(DeleteNodeError::NotFound),
            Err(GetNodeError::DbFailure) => return Err(DeleteNodeError::DbFailure),
        }
    };
    let tree = state.locks.for_tree(evidence_id);
    let _guard = hold(&tree);
    let con = open(&state.db).map_err(|_| DeleteNodeError::DbFailure)?;
    // could have been deleted while waiting for the lock
    let node = match find_node(id, &con) {
        Ok(node) => node,
        Err(GetNodeError::NotFound) => return Err(DeleteNodeError::NotFound),
        Err(GetNodeError::DbFailure) => return Err(DeleteNodeError::DbFailure),
    };
    if node.is_folder() {
        let children = node_repository::count_children(id, &con).map_err(|e| {
            log_db_error(&format!("count children of folder {id}"), &e);
            DeleteNodeError::DbFailure
        })?;
        if children > 0 {
            return Err(DeleteNodeError::NotEmpty);
        }
    }
    node_repository::delete(id, &con).map_err(|e| {
        log_db_error(&format!("delete node {id}"), &e);
        DeleteNodeError::DbFailure
    })?;
    propagate(node.parent_id, &con);
    if !node.is_folder() {
        refresh_status(node.evidence_id, &con);
    }
    log::info!("Deleted node {id} ({}) from evidence {}", node.name, node.evidence_id);
    Ok(node)
}

/// renames a folder. Files keep the name they were uploaded with
pub fn rename_node(
    state: &AppState,
    id: u32,
    request: &RenameNodeRequest,
) -> Result<NodeApi, UpdateNodeError> {
    let name = sanitize_name(&request.name).ok_or(UpdateNodeError::InvalidName)?;
    let evidence_id = {
        let con = open(&state.db).map_err(|_| UpdateNodeError::DbFailure)?;
        match find_node(id, &con) {
            Ok(node) => node.evidence_id,
            Err(GetNodeError::NotFound) => return Err(UpdateNodeError::NotFound),
            Err(GetNodeError::DbFailure) => return Err(UpdateNodeError::DbFailure),
        }
    };
    let tree = state.locks.for_tree(evidence_id);
    let _guard = hold(&tree);
    let con = open(&state.db).map_err(|_| UpdateNodeError::DbFailure)?;
    let node = match find_node(id, &con) {
        Ok(node) => node,
        Err(GetNodeError::NotFound) => return Err(UpdateNodeError::NotFound),
        Err(GetNodeError::DbFailure) => return Err(UpdateNodeError::DbFailure),
    };
    if !node.is_folder() {
        return Err(UpdateNodeError::NotAFolder);
    }
    let duplicates = node_repository::count_sibling_folders_with_name(
        node.evidence_id,
        node.parent_id,
        &name,
        id,
        &con,
    )
    .map_err(|e| {
        log_db_error(&format!("check for duplicate folder {name}"), &e);
        UpdateNodeError::DbFailure
    })?;
    if duplicates > 0 {
        return Err(UpdateNodeError::AlreadyExists);
    }
    node_repository::rename(id, &name, now(), &con)
        .and_then(|_| node_repository::get_by_id(id, &con))
        .map(NodeApi::from)
        .map_err(|e| {
            log_db_error(&format!("rename folder {id}"), &e);
            UpdateNodeError::DbFailure
        })
}

/// the direct children of `folder_id`, or of the evidence root if `None`. Folders come first, then by name
pub fn get_folder_contents(
    db: &Database,
    evidence_id: u32,
    folder_id: Option<u32>,
) -> Result<Vec<NodeApi>, GetNodeError> {
    let con = open(db).map_err(|_| GetNodeError::DbFailure)?;
    check_evidence_exists(evidence_id, &con)?;
    let children = match folder_id {
        None => node_repository::get_root_nodes(evidence_id, &con),
        Some(folder_id) => {
            let folder = find_node(folder_id, &con)?;
            if !folder.is_folder() || folder.evidence_id != evidence_id {
                return Err(GetNodeError::NotFound);
            }
            node_repository::get_child_nodes(folder_id, &con)
        }
    }
    .map_err(|e| {
        log_db_error(&format!("retrieve contents of folder {folder_id:?}"), &e);
        GetNodeError::DbFailure
    })?;
    Ok(children.into_iter().map(NodeApi::from).collect())
}

/// the whole evidence tree, nested. Nodes caught in a parent loop can't be placed and are left out
pub fn get_tree(db: &Database, evidence_id: u32) -> Result<Vec<TreeNodeApi>, GetNodeError> {
    let con = open(db).map_err(|_| GetNodeError::DbFailure)?;
    check_evidence_exists(evidence_id, &con)?;
    let nodes = node_repository::get_nodes_for_evidence(evidence_id, &con).map_err(|e| {
        log_db_error(&format!("retrieve nodes of evidence {evidence_id}"), &e);
        GetNodeError::DbFailure
    })?;
    let total = nodes.len();
    let tree = build_tree(nodes);
    let placed = count_tree_nodes(&tree);
    if placed != total {
        log::warn!(
            "{} node(s) of evidence {evidence_id} are unreachable from the root",
            total - placed
        );
    }
    Ok(tree)
}

/// nests a flat node list under its parents, keeping the order the nodes came in
pub fn build_tree(nodes: Vec<Node>) -> Vec<TreeNodeApi> {
    let mut children: HashMap<Option<u32>, Vec<Node>> = HashMap::new();
    for node in nodes {
        children.entry(node.parent_id).or_default().push(node);
    }
    let mut visited = HashSet::new();
    attach_children(None, &mut children, &mut visited, 0)
}

fn attach_children(
    parent: Option<u32>,
    children: &mut HashMap<Option<u32>, Vec<Node>>,
    visited: &mut HashSet<u32>,
    depth: u32,
) -> Vec<TreeNodeApi> {
    if depth > MAX_TREE_DEPTH {
        return Vec::new();
    }
    let Some(nodes) = children.remove(&parent) else {
        return Vec::new();
    };
    let mut attached = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !visited.insert(node.id) {
            continue;
        }
        let nested = if node.is_folder() {
            attach_children(Some(node.id), children, visited, depth + 1)
        } else {
            Vec::new()
        };
        attached.push(TreeNodeApi {
            node: node.into(),
            children: nested,
        });
    }
    attached
}

fn count_tree_nodes(tree: &[TreeNodeApi]) -> usize {
    tree.iter()
        .map(|node| 1 + count_tree_nodes(&node.children))
        .sum()
}

/// a file's bytes, ready to stream back to the client
pub struct Download {
    pub name: String,
    pub mime_type: String,
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
}

/// opens a file's bytes and counts the download
pub async fn download_file(state: &AppState, id: u32) -> Result<Download, DownloadFileError> {
    let node = {
        let con = open(&state.db).map_err(|_| DownloadFileError::DbFailure)?;
        match find_node(id, &con) {
            Ok(node) => node,
            Err(GetNodeError::NotFound) => return Err(DownloadFileError::NotFound),
            Err(GetNodeError::DbFailure) => return Err(DownloadFileError::DbFailure),
        }
    };
    let NodeKind::File(file) = node.kind else {
        return Err(DownloadFileError::NotAFile);
    };
    let reader = state.blobs.open(&file.storage_handle).await.map_err(|e| {
        log::error!("Failed to open blob for file {id}. Exception is {e:?}");
        DownloadFileError::BlobFailure
    })?;
    let recorded = state
        .db
        .open_connection()
        .and_then(|con| node_repository::record_download(id, now(), &con));
    if let Err(e) = recorded {
        // the download still works, only the counter is off
        log_db_error(&format!("record download of file {id}"), &e);
    }
    Ok(Download {
        name: node.name,
        mime_type: file.mime_type,
        reader,
    })
}

/// checks that `parent_id` can hold new nodes of `evidence_id`: the evidence exists, and the parent (if any)
/// is a folder of that same evidence
fn check_destination(
    evidence_id: u32,
    parent_id: Option<u32>,
    con: &Connection,
) -> Result<(), CreateNodeError> {
    match check_evidence_exists(evidence_id, con) {
        Ok(()) => {}
        Err(GetNodeError::NotFound) => return Err(CreateNodeError::EvidenceNotFound),
        Err(GetNodeError::DbFailure) => return Err(CreateNodeError::DbFailure),
    }
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    match node_repository::find_by_id(parent_id, con) {
        Ok(Some(parent)) if parent.is_folder() && parent.evidence_id == evidence_id => Ok(()),
        Ok(_) => Err(CreateNodeError::InvalidParent),
        Err(e) => {
            log_db_error(&format!("retrieve parent folder {parent_id}"), &e);
            Err(CreateNodeError::DbFailure)
        }
    }
}

fn check_evidence_exists(evidence_id: u32, con: &Connection) -> Result<(), GetNodeError> {
    match evidence_repository::get_by_id(evidence_id, con) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(GetNodeError::NotFound),
        Err(e) => {
            log_db_error(&format!("retrieve evidence {evidence_id}"), &e);
            Err(GetNodeError::DbFailure)
        }
    }
}

pub(crate) fn find_node(id: u32, con: &Connection) -> Result<Node, GetNodeError> {
    match node_repository::find_by_id(id, con) {
        Ok(Some(node)) => Ok(node),
        Ok(None) => Err(GetNodeError::NotFound),
        Err(e) => {
            log_db_error(&format!("retrieve node {id}"), &e);
            Err(GetNodeError::DbFailure)
        }
    }
}

pub(crate) fn open(db: &Database) -> Result<Connection, ()> {
    db.open_connection()
        .map_err(|e| log_db_error("open database connection", &e))
}

/// deletes the blob unless some other file still points at it. Failures are only logged
async fn release_blob(state: &AppState, handle: &str) {
    let _blob_guard = state.blob_locks.lock(handle).await;
    delete_unreferenced_blob(state, handle).await;
}

/// the caller must hold the handle's blob lock
async fn delete_unreferenced_blob(state: &AppState, handle: &str) {
    let references = state
        .db
        .open_connection()
        .and_then(|con| node_repository::count_storage_handle(handle, &con));
    match references {
        Ok(0) => {
            if let Err(e) = state.blobs.delete(handle).await {
                log::warn!("Failed to delete blob {handle}: {e:?}");
            }
        }
        Ok(_) => log::debug!("Keeping blob {handle}, other files still use it"),
        Err(e) => log_db_error(&format!("count references to blob {handle}"), &e),
    }
}
