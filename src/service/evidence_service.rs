use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::approval::models::aggregate_status;
use crate::locks::hold;
use crate::model::api::EvidenceApi;
use crate::model::error::evidence_errors::{CreateEvidenceError, GetEvidenceError};
use crate::model::node_types::EvidenceStatus;
use crate::model::repository::Evidence;
use crate::model::request::evidence_requests::CreateEvidenceRequest;
use crate::repository::{evidence_repository, node_repository, Database};
use crate::service::{log_db_error, now};
use crate::state::AppState;

//language=RegExp
static CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^H\d+\.\d{2}\.\d{2}\.\d{2}$").expect("valid regex"));

pub const MAX_NAME_LENGTH: usize = 500;

pub fn create_evidence(
    db: &Database,
    request: &CreateEvidenceRequest,
) -> Result<EvidenceApi, CreateEvidenceError> {
    let code = request.code.trim().to_uppercase();
    if !CODE_REGEX.is_match(&code) {
        return Err(CreateEvidenceError::InvalidCode);
    }
    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(CreateEvidenceError::InvalidName);
    }
    let con = db.open_connection().map_err(|e| {
        log_db_error("open database connection", &e);
        CreateEvidenceError::DbFailure
    })?;
    match evidence_repository::get_by_code(&code, &con) {
        Ok(Some(_)) => return Err(CreateEvidenceError::AlreadyExists),
        Ok(None) => {}
        Err(e) => {
            log_db_error(&format!("check for evidence with code {code}"), &e);
            return Err(CreateEvidenceError::DbFailure);
        }
    }
    let created = evidence_repository::create_evidence(&code, name, request.criteria_id, now(), &con)
        .and_then(|id| evidence_repository::get_by_id(id, &con))
        .map_err(|e| {
            log_db_error(&format!("create evidence {code}"), &e);
            CreateEvidenceError::DbFailure
        })?;
    log::info!("Created evidence {} ({code})", created.id);
    Ok(EvidenceApi::from_with_files(created, Vec::new()))
}

/// the bare evidence row, used to find out which criteria an operation is scoped to
pub fn get_evidence_record(db: &Database, id: u32) -> Result<Evidence, GetEvidenceError> {
    let con = db.open_connection().map_err(|e| {
        log_db_error("open database connection", &e);
        GetEvidenceError::DbFailure
    })?;
    find_evidence(id, &con)
}

pub fn get_evidence(db: &Database, id: u32) -> Result<EvidenceApi, GetEvidenceError> {
    let con = db.open_connection().map_err(|e| {
        log_db_error("open database connection", &e);
        GetEvidenceError::DbFailure
    })?;
    let evidence = find_evidence(id, &con)?;
    let files = evidence_repository::get_node_ids(id, &con).map_err(|e| {
        log_db_error(&format!("retrieve nodes of evidence {id}"), &e);
        GetEvidenceError::DbFailure
    })?;
    Ok(EvidenceApi::from_with_files(evidence, files))
}

/// marks that work on the evidence has started, which moves an evidence without reviewed files to `in_progress`
pub fn touch_evidence(state: &AppState, id: u32) -> Result<EvidenceApi, GetEvidenceError> {
    {
        let tree = state.locks.for_tree(id);
        let _guard = hold(&tree);
        let con = state.db.open_connection().map_err(|e| {
            log_db_error("open database connection", &e);
            GetEvidenceError::DbFailure
        })?;
        find_evidence(id, &con)?;
        evidence_repository::mark_touched(id, now(), &con).map_err(|e| {
            log_db_error(&format!("touch evidence {id}"), &e);
            GetEvidenceError::DbFailure
        })?;
        recompute_evidence_status(id, &con).map_err(|e| {
            log_db_error(&format!("recompute status of evidence {id}"), &e);
            GetEvidenceError::DbFailure
        })?;
    }
    get_evidence(&state.db, id)
}

/// Re-derives the evidence's status from its files' current approval states, and stores it if it changed.
///
/// The caller must hold the evidence's tree lock, and any file change this follows must already be written
pub fn recompute_evidence_status(
    evidence_id: u32,
    con: &Connection,
) -> Result<EvidenceStatus, rusqlite::Error> {
    let evidence = evidence_repository::get_by_id(evidence_id, con)?;
    let statuses = node_repository::get_file_approval_statuses(evidence_id, con)?;
    let status = aggregate_status(&statuses, evidence.touched);
    if status != evidence.status {
        log::info!(
            "Evidence {evidence_id} status changed from {} to {status}",
            evidence.status
        );
        evidence_repository::update_status(evidence_id, status, now(), con)?;
    }
    Ok(status)
}

/// [`recompute_evidence_status`] for callers whose own change already succeeded, logging instead of failing
pub fn refresh_status(evidence_id: u32, con: &Connection) {
    if let Err(e) = recompute_evidence_status(evidence_id, con) {
        log_db_error(&format!("recompute status of evidence {evidence_id}"), &e);
    }
}

fn find_evidence(id: u32, con: &Connection) -> Result<Evidence, GetEvidenceError> {
    evidence_repository::get_by_id(id, con).map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => GetEvidenceError::NotFound,
        e => {
            log_db_error(&format!("retrieve evidence {id}"), &e);
            GetEvidenceError::DbFailure
        }
    })
}
