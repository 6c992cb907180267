use std::backtrace::Backtrace;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::node_types::{ApprovalStatus, NodeType, ProcessStatus};
use crate::model::repository::{
    ChildAggregate, EvidenceStatistics, FileAttributes, FolderMetadata, MimeTypeStatistics, NewFile,
    NewFolder, Node, NodeKind, Review,
};
use crate::model::request::search_requests::FileSearch;

/// creates a folder record in the database.
/// This does not do any checks on the parent or sibling names, and that must be done before this function is called
pub fn create_folder(folder: &NewFolder, con: &Connection) -> Result<u32, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/create_folder.sql"))?;
    let id = pst.insert(params![
        folder.evidence_id,
        folder.parent_id,
        folder.name,
        folder.created_by,
        folder.create_date
    ])? as u32;
    Ok(id)
}

/// creates a file record in the database with `processStatus = pending`.
/// The bytes must already be in the blob store
pub fn create_file(file: &NewFile, con: &Connection) -> Result<u32, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/create_file.sql"))?;
    let id = pst.insert(params![
        file.evidence_id,
        file.parent_id,
        file.name,
        file.uploaded_by,
        file.upload_date,
        file.size as i64,
        file.mime_type,
        file.extension,
        file.storage_handle,
        file.review.status,
        file.review.reviewed_by,
        file.review.review_date
    ])? as u32;
    Ok(id)
}

pub fn get_by_id(id: u32, con: &Connection) -> Result<Node, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/get_node_by_id.sql"))?;
    pst.query_row([id], map_node)
}

/// returns the direct children of the folder, folders first and then by name
pub fn get_child_nodes(folder_id: u32, con: &Connection) -> Result<Vec<Node>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/get_child_nodes.sql"))?;
    let rows = pst.query_map([folder_id], map_node)?;
    rows.collect()
}

/// returns the nodes that have no parent within the evidence, folders first and then by name
pub fn get_root_nodes(evidence_id: u32, con: &Connection) -> Result<Vec<Node>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/get_root_nodes.sql"))?;
    let rows = pst.query_map([evidence_id], map_node)?;
    rows.collect()
}

/// every node in the evidence, regardless of depth
pub fn get_nodes_for_evidence(
    evidence_id: u32,
    con: &Connection,
) -> Result<Vec<Node>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/get_nodes_for_evidence.sql"
    ))?;
    let rows = pst.query_map([evidence_id], map_node)?;
    rows.collect()
}

pub fn count_children(id: u32, con: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = con.query_row(
        include_str!("../assets/queries/node/count_children.sql"),
        [id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// returns the parent of the node with the passed id.
/// `Ok(None)` means the node is at the root, a missing node is [`rusqlite::Error::QueryReturnedNoRows`]
pub fn get_parent_id(id: u32, con: &Connection) -> Result<Option<u32>, rusqlite::Error> {
    con.query_row(
        include_str!("../assets/queries/node/get_parent_id.sql"),
        [id],
        |row| row.get(0),
    )
}

/// This does not check for cycles, and that must be done before this function is called
pub fn update_parent(id: u32, parent_id: Option<u32>, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/update_parent.sql"))?;
    pst.execute(params![parent_id, id])?;
    Ok(())
}

pub fn rename(
    id: u32,
    name: &str,
    modified: NaiveDateTime,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/rename_node.sql"))?;
    pst.execute(params![name, modified, id])?;
    Ok(())
}

/// removes the node row. This _does not_ check for children first
pub fn delete(id: u32, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/delete_node.sql"))?;
    pst.execute([id])?;
    Ok(())
}

/// counts the folders directly inside `parent_id` (or the evidence root if `None`) whose name case-insensitively
/// matches `name`, ignoring the node with id `excluding`
pub fn count_sibling_folders_with_name(
    evidence_id: u32,
    parent_id: Option<u32>,
    name: &str,
    excluding: u32,
    con: &Connection,
) -> Result<u64, rusqlite::Error> {
    let count: i64 = con.query_row(
        include_str!("../assets/queries/node/count_sibling_folders_with_name.sql"),
        params![evidence_id, parent_id, name, excluding],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// returns just enough of each direct child to rebuild the folder's aggregate
pub fn get_child_aggregates(
    folder_id: u32,
    con: &Connection,
) -> Result<Vec<ChildAggregate>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/get_child_aggregates.sql"
    ))?;
    let rows = pst.query_map([folder_id], |row| {
        Ok(ChildAggregate {
            node_type: row.get(0)?,
            size: get_u64(row, 1)?,
            file_count: get_u64(row, 2)?,
            total_size: get_u64(row, 3)?,
        })
    })?;
    rows.collect()
}

pub fn update_folder_metadata(
    folder_id: u32,
    metadata: &FolderMetadata,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/update_folder_metadata.sql"
    ))?;
    pst.execute(params![
        metadata.file_count as i64,
        metadata.total_size as i64,
        metadata.last_modified,
        folder_id
    ])?;
    Ok(())
}

/// returns the ids of every folder reachable from the evidence root, deepest folders first.
/// Folders deeper than `max_depth` are left out, which also keeps the query finite if the parent chain loops
pub fn get_folder_ids_deepest_first(
    evidence_id: u32,
    max_depth: u32,
    con: &Connection,
) -> Result<Vec<u32>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/get_folder_ids_deepest_first.sql"
    ))?;
    let rows = pst.query_map(params![evidence_id, max_depth], |row| row.get(0))?;
    rows.collect()
}

/// counts how many file nodes point at the same blob
pub fn count_storage_handle(handle: &str, con: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = con.query_row(
        include_str!("../assets/queries/node/count_storage_handle.sql"),
        [handle],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub fn record_download(
    id: u32,
    downloaded: NaiveDateTime,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/record_download.sql"))?;
    pst.execute(params![downloaded, id])?;
    Ok(())
}

/// the approval status of every file in the evidence, at any depth
pub fn get_file_approval_statuses(
    evidence_id: u32,
    con: &Connection,
) -> Result<Vec<ApprovalStatus>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/get_file_approval_statuses.sql"
    ))?;
    let rows = pst.query_map([evidence_id], |row| row.get(0))?;
    rows.collect()
}

pub fn update_review(id: u32, review: &Review, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/update_approval.sql"))?;
    pst.execute(params![
        review.status,
        review.reviewed_by,
        review.review_date,
        review.rejection_reason,
        id
    ])?;
    Ok(())
}

/// atomically moves the file into `processing`, returning the number of the run that now holds the claim.
///
/// Returns `None` without changing anything if the file is already being processed (or isn't a file),
/// which is what keeps a file down to one pipeline run at a time
pub fn claim_processing(id: u32, con: &Connection) -> Result<Option<u32>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/claim_processing.sql"))?;
    pst.query_row([id], |row| row.get(0)).optional()
}

/// the run number of the file's latest claim. `None` if there's no such node
pub fn get_process_run(id: u32, con: &Connection) -> Result<Option<u32>, rusqlite::Error> {
    con.query_row(
        include_str!("../assets/queries/node/get_process_run.sql"),
        [id],
        |row| row.get(0),
    )
    .optional()
}

/// stores the pipeline output. Only applies while `run` still holds the claim, and
/// returns whether anything was updated. A `None` vector id keeps whatever vector id the file already had
pub fn complete_processing(
    id: u32,
    run: u32,
    content: &str,
    summary: &str,
    vector_id: Option<&str>,
    con: &Connection,
) -> Result<bool, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/complete_processing.sql"
    ))?;
    Ok(pst.execute(params![content, summary, vector_id, id, run])? == 1)
}

/// marks a running pipeline as failed. Text extracted by an earlier run is kept, so it stays searchable
pub fn fail_processing(id: u32, run: u32, con: &Connection) -> Result<bool, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/fail_processing.sql"))?;
    Ok(pst.execute([id, run])? == 1)
}

/// puts every file stuck in `processing` back to `pending`, returning their ids.
/// Only meant to be called on startup, before any worker is running
pub fn release_interrupted_processing(con: &Connection) -> Result<Vec<u32>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/release_interrupted_processing.sql"
    ))?;
    let rows = pst.query_map([], |row| row.get(0))?;
    rows.collect()
}

pub fn search_files(search: &FileSearch, con: &Connection) -> Result<Vec<Node>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/node/search_files.sql"))?;
    let keyword = search
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    let file_type = search
        .file_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let rows = pst.query_map(
        params![
            search.evidence_id,
            keyword,
            file_type,
            search.min_size.map(|s| s as i64),
            search.max_size.map(|s| s as i64),
            search.uploaded_by,
            search.date_from,
            search.date_to
        ],
        map_node,
    )?;
    rows.collect()
}

pub fn get_statistics(
    evidence_id: u32,
    con: &Connection,
) -> Result<EvidenceStatistics, rusqlite::Error> {
    con.query_row(
        include_str!("../assets/queries/node/get_statistics.sql"),
        [evidence_id],
        |row| {
            Ok(EvidenceStatistics {
                total_files: get_u64(row, 0)?,
                total_folders: get_u64(row, 1)?,
                total_size: get_u64(row, 2)?,
                total_downloads: get_u64(row, 3)?,
            })
        },
    )
}

pub fn get_mime_type_statistics(
    evidence_id: u32,
    con: &Connection,
) -> Result<Vec<MimeTypeStatistics>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/node/get_mime_type_statistics.sql"
    ))?;
    let rows = pst.query_map([evidence_id], |row| {
        let mime_type: Option<String> = row.get(0)?;
        Ok(MimeTypeStatistics {
            mime_type: mime_type.unwrap_or_default(),
            count: get_u64(row, 1)?,
            total_size: get_u64(row, 2)?,
        })
    })?;
    rows.collect()
}

/// like [`get_by_id`], but a missing node is `Ok(None)` instead of an error
pub fn find_by_id(id: u32, con: &Connection) -> Result<Option<Node>, rusqlite::Error> {
    get_by_id(id, con).optional()
}

/// sqlite only has signed integers, and sizes are never negative
fn get_u64(row: &Row, index: usize) -> Result<u64, rusqlite::Error> {
    let value: i64 = row.get(index)?;
    Ok(value.max(0) as u64)
}

/// maps a row selected with the column list shared by every `select` in `assets/queries/node`
fn map_node(row: &Row) -> Result<Node, rusqlite::Error> {
    let node_type: NodeType = row.get(3)?;
    let kind = match node_type {
        NodeType::Folder => NodeKind::Folder(FolderMetadata {
            file_count: get_u64(row, 21)?,
            total_size: get_u64(row, 22)?,
            last_modified: row.get(23)?,
        }),
        NodeType::File => {
            let status: Option<ApprovalStatus> = row.get(11)?;
            let process_status: Option<ProcessStatus> = row.get(15)?;
            let storage_handle: Option<String> = row.get(10)?;
            if storage_handle.is_none() {
                log::warn!(
                    "File node {:?} has no storage handle!\n{}",
                    row.get::<_, u32>(0),
                    Backtrace::force_capture()
                );
            }
            NodeKind::File(FileAttributes {
                size: get_u64(row, 7)?,
                mime_type: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                extension: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                storage_handle: storage_handle.unwrap_or_default(),
                review: Review {
                    status: status.unwrap_or(ApprovalStatus::Pending),
                    reviewed_by: row.get(12)?,
                    review_date: row.get(13)?,
                    rejection_reason: row.get(14)?,
                },
                process_status: process_status.unwrap_or(ProcessStatus::Pending),
                extracted_content: row.get(16)?,
                summary: row.get(17)?,
                vector_id: row.get(18)?,
                download_count: row.get(19)?,
                last_downloaded: row.get(20)?,
            })
        }
    };
    Ok(Node {
        id: row.get(0)?,
        evidence_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(4)?,
        uploaded_by: row.get(5)?,
        upload_date: row.get(6)?,
        kind,
    })
}
