use std::fs::remove_file;
use std::path::Path;

use rusqlite::Connection;

use crate::model::node_types::{ApprovalStatus, EvidenceStatus, NodeType, ProcessStatus};
use crate::model::repository::{NewFile, NewFolder, Review};
use crate::repository::{evidence_repository, metadata_repository, node_repository, DB_VERSION};
use crate::service::now;
use crate::test::*;

fn folder(evidence_id: u32, parent_id: Option<u32>, name: &str, con: &Connection) -> u32 {
    node_repository::create_folder(
        &NewFolder {
            evidence_id,
            parent_id,
            name: name.to_string(),
            created_by: 1,
            create_date: now(),
        },
        con,
    )
    .unwrap()
}

fn file(evidence_id: u32, parent_id: Option<u32>, name: &str, size: u64, con: &Connection) -> u32 {
    node_repository::create_file(
        &NewFile {
            evidence_id,
            parent_id,
            name: name.to_string(),
            uploaded_by: 1,
            upload_date: now(),
            size,
            mime_type: "application/pdf".to_string(),
            extension: ".pdf".to_string(),
            storage_handle: format!("{name}-handle"),
            review: Review::pending(),
        },
        con,
    )
    .unwrap()
}

fn remove_file_if_exists(location: &str) {
    remove_file(Path::new(location)).unwrap_or(());
}

fn evidence(code: &str, con: &Connection) -> u32 {
    evidence_repository::create_evidence(code, "name", TEST_CRITERIA, now(), con).unwrap()
}

#[test]
fn initialize_sets_version() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    assert_eq!(DB_VERSION.to_string(), metadata_repository::get_version(&con).unwrap());
    // a second initialize leaves an up to date database alone
    db.initialize().unwrap();
    cleanup();
}

#[test]
fn evidence_round_trip_and_lookup_by_code() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let id = evidence("H1.01.01.01", &con);
    let stored = evidence_repository::get_by_id(id, &con).unwrap();
    assert_eq!("H1.01.01.01", stored.code);
    assert_eq!(EvidenceStatus::New, stored.status);
    assert!(!stored.touched);
    assert_eq!(
        Some(id),
        evidence_repository::get_by_code("H1.01.01.01", &con)
            .unwrap()
            .map(|e| e.id)
    );
    assert_eq!(None, evidence_repository::get_by_code("H9.99.99.99", &con).unwrap());
    evidence_repository::mark_touched(id, now(), &con).unwrap();
    evidence_repository::update_status(id, EvidenceStatus::InProgress, now(), &con).unwrap();
    let stored = evidence_repository::get_by_id(id, &con).unwrap();
    assert!(stored.touched);
    assert_eq!(EvidenceStatus::InProgress, stored.status);
    cleanup();
}

#[test]
fn new_file_defaults() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = file(evidence_id, None, "a.pdf", 10, &con);
    let node = node_repository::get_by_id(id, &con).unwrap();
    assert_eq!(NodeType::File, node.node_type());
    let attributes = node.as_file().unwrap();
    assert_eq!(ApprovalStatus::Pending, attributes.review.status);
    assert_eq!(ProcessStatus::Pending, attributes.process_status);
    assert_eq!(0, attributes.download_count);
    assert_eq!(None, node_repository::find_by_id(id + 1, &con).unwrap());
    cleanup();
}

#[test]
fn children_and_roots_list_folders_first() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let other = evidence("H1.01.01.02", &con);
    file(evidence_id, None, "a.pdf", 1, &con);
    let b = folder(evidence_id, None, "b", &con);
    folder(other, None, "elsewhere", &con);
    let inner = file(evidence_id, Some(b), "inner.pdf", 1, &con);
    let roots: Vec<String> = node_repository::get_root_nodes(evidence_id, &con)
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(vec!["b".to_string(), "a.pdf".to_string()], roots);
    assert_eq!(1, node_repository::get_child_nodes(b, &con).unwrap().len());
    assert_eq!(1, node_repository::count_children(b, &con).unwrap());
    assert_eq!(Some(b), node_repository::get_parent_id(inner, &con).unwrap());
    cleanup();
}

#[test]
fn sibling_folder_name_check_ignores_case_and_self() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = folder(evidence_id, None, "Minutes", &con);
    assert_eq!(
        1,
        node_repository::count_sibling_folders_with_name(evidence_id, None, "MINUTES", 0, &con)
            .unwrap()
    );
    assert_eq!(
        0,
        node_repository::count_sibling_folders_with_name(evidence_id, None, "minutes", id, &con)
            .unwrap()
    );
    cleanup();
}

#[test]
fn claim_processing_only_once() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = file(evidence_id, None, "a.pdf", 1, &con);
    let folder_id = folder(evidence_id, None, "f", &con);
    assert_eq!(Some(1), node_repository::claim_processing(id, &con).unwrap());
    assert_eq!(None, node_repository::claim_processing(id, &con).unwrap());
    assert_eq!(None, node_repository::claim_processing(folder_id, &con).unwrap());
    assert!(node_repository::complete_processing(id, 1, "text", "sum", Some("v1"), &con).unwrap());
    // results only land while the file is claimed
    assert!(!node_repository::complete_processing(id, 1, "x", "y", Some("v2"), &con).unwrap());
    assert_eq!(Some(2), node_repository::claim_processing(id, &con).unwrap());
    assert!(node_repository::complete_processing(id, 2, "text 2", "sum 2", None, &con).unwrap());
    let node = node_repository::get_by_id(id, &con).unwrap();
    let attributes = node.as_file().unwrap();
    assert_eq!(Some("v1".to_string()), attributes.vector_id);
    assert_eq!(Some("text 2".to_string()), attributes.extracted_content);
    cleanup();
}

#[test]
fn only_current_run_can_finish_processing() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = file(evidence_id, None, "a.pdf", 1, &con);
    assert_eq!(Some(1), node_repository::claim_processing(id, &con).unwrap());
    assert!(node_repository::complete_processing(id, 1, "first", "first", Some("v1"), &con).unwrap());
    assert_eq!(Some(2), node_repository::claim_processing(id, &con).unwrap());
    // the server restarts mid-run and claims the file again
    assert_eq!(vec![id], node_repository::release_interrupted_processing(&con).unwrap());
    assert_eq!(Some(3), node_repository::claim_processing(id, &con).unwrap());
    assert!(!node_repository::complete_processing(id, 2, "stale", "stale", Some("v2"), &con).unwrap());
    assert!(!node_repository::fail_processing(id, 2, &con).unwrap());
    assert_eq!(Some(3), node_repository::get_process_run(id, &con).unwrap());
    assert!(node_repository::fail_processing(id, 3, &con).unwrap());
    let node = node_repository::get_by_id(id, &con).unwrap();
    let attributes = node.as_file().unwrap();
    assert_eq!(ProcessStatus::Failed, attributes.process_status);
    // a failed run keeps what the last good run extracted
    assert_eq!(Some("first".to_string()), attributes.extracted_content);
    assert_eq!(Some("v1".to_string()), attributes.vector_id);
    assert_eq!(None, node_repository::get_process_run(999, &con).unwrap());
    cleanup();
}

#[test]
fn initialize_migrates_version_one_database() {
    remove_file_if_exists(&db_location());
    let con = rusqlite::Connection::open(db_location()).unwrap();
    // the version one schema had no processRun column
    con.execute_batch(
        &include_str!("../../assets/init.sql")
            .replace("    processRun       integer not null default 0,\n", "")
            .replace("values ('version', '2')", "values ('version', '1')"),
    )
    .unwrap();
    drop(con);
    let db = crate::repository::Database::new(db_location());
    db.initialize().unwrap();
    let con = db.open_connection().unwrap();
    assert_eq!(DB_VERSION.to_string(), metadata_repository::get_version(&con).unwrap());
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = file(evidence_id, None, "a.pdf", 1, &con);
    assert_eq!(Some(1), node_repository::claim_processing(id, &con).unwrap());
    cleanup();
}

#[test]
fn storage_handles_are_counted() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    file(evidence_id, None, "a.pdf", 1, &con);
    assert_eq!(1, node_repository::count_storage_handle("a.pdf-handle", &con).unwrap());
    assert_eq!(0, node_repository::count_storage_handle("missing", &con).unwrap());
    cleanup();
}

#[test]
fn deepest_folders_come_first() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let a = folder(evidence_id, None, "a", &con);
    let b = folder(evidence_id, Some(a), "b", &con);
    let c = folder(evidence_id, Some(b), "c", &con);
    let d = folder(evidence_id, None, "d", &con);
    assert_eq!(
        vec![c, b, a, d],
        node_repository::get_folder_ids_deepest_first(evidence_id, 256, &con).unwrap()
    );
    assert_eq!(
        vec![b, a, d],
        node_repository::get_folder_ids_deepest_first(evidence_id, 1, &con).unwrap()
    );
    cleanup();
}

#[test]
fn deleting_evidence_cascades_to_nodes() {
    let db = refresh_db();
    let con = db.open_connection().unwrap();
    let evidence_id = evidence("H1.01.01.01", &con);
    let id = file(evidence_id, None, "a.pdf", 1, &con);
    con.execute("delete from Evidence where id = ?1", [evidence_id])
        .unwrap();
    assert_eq!(None, node_repository::find_by_id(id, &con).unwrap());
    cleanup();
}
