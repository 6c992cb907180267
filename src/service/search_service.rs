use crate::model::api::{NodeApi, StatisticsApi};
use crate::model::error::evidence_errors::GetEvidenceError;
use crate::model::error::node_errors::SearchFileError;
use crate::model::request::search_requests::FileSearch;
use crate::repository::{evidence_repository, node_repository, Database};
use crate::service::log_db_error;

/// finds every node matching all of the set filters, newest first
pub fn search_files(db: &Database, search: &FileSearch) -> Result<Vec<NodeApi>, SearchFileError> {
    if let (Some(min), Some(max)) = (search.min_size, search.max_size) {
        if min > max {
            return Err(SearchFileError::InvalidFilter);
        }
    }
    if let (Some(from), Some(to)) = (search.date_from, search.date_to) {
        if from > to {
            return Err(SearchFileError::InvalidFilter);
        }
    }
    let con = db.open_connection().map_err(|e| {
        log_db_error("open database connection", &e);
        SearchFileError::DbFailure
    })?;
    let nodes = node_repository::search_files(search, &con).map_err(|e| {
        log_db_error(&format!("search files with {search:?}"), &e);
        SearchFileError::DbFailure
    })?;
    Ok(nodes.into_iter().map(NodeApi::from).collect())
}

/// totals for the whole evidence tree, along with a breakdown per mime type
pub fn file_statistics(db: &Database, evidence_id: u32) -> Result<StatisticsApi, GetEvidenceError> {
    let con = db.open_connection().map_err(|e| {
        log_db_error("open database connection", &e);
        GetEvidenceError::DbFailure
    })?;
    match evidence_repository::get_by_id(evidence_id, &con) {
        Ok(_) => {}
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(GetEvidenceError::NotFound),
        Err(e) => {
            log_db_error(&format!("retrieve evidence {evidence_id}"), &e);
            return Err(GetEvidenceError::DbFailure);
        }
    }
    let totals = node_repository::get_statistics(evidence_id, &con);
    let per_type = node_repository::get_mime_type_statistics(evidence_id, &con);
    match (totals, per_type) {
        (Ok(totals), Ok(per_type)) => Ok(StatisticsApi::from_parts(totals, per_type)),
        (Err(e), _) | (_, Err(e)) => {
            log_db_error(&format!("compute statistics for evidence {evidence_id}"), &e);
            Err(GetEvidenceError::DbFailure)
        }
    }
}
