use crate::approval::models::{check_transition, ReviewDecision};
use crate::locks::hold;
use crate::model::api::NodeApi;
use crate::model::error::approval_errors::ApprovalError;
use crate::model::error::node_errors::GetNodeError;
use crate::model::repository::Review;
use crate::repository::node_repository;
use crate::service::evidence_service::recompute_evidence_status;
use crate::service::node_service::{find_node, open};
use crate::service::{log_db_error, now};
use crate::state::AppState;

pub fn approve_file(state: &AppState, file_id: u32, reviewer: u32) -> Result<NodeApi, ApprovalError> {
    review_file(state, file_id, ReviewDecision::Approve, reviewer)
}

/// rejects a file. The reason must not be blank
pub fn reject_file(
    state: &AppState,
    file_id: u32,
    reason: Option<&str>,
    reviewer: u32,
) -> Result<NodeApi, ApprovalError> {
    let decision = ReviewDecision::reject(reason)?;
    review_file(state, file_id, decision, reviewer)
}

/// Records a reviewer's decision on a file and then re-derives the status of the file's evidence.
///
/// Both writes happen in one transaction while holding the evidence's tree lock, so the evidence status is
/// always computed from a file list that already includes this decision
pub fn review_file(
    state: &AppState,
    file_id: u32,
    decision: ReviewDecision,
    reviewer: u32,
) -> Result<NodeApi, ApprovalError> {
    let evidence_id = {
        let con = open(&state.db).map_err(|_| ApprovalError::DbFailure)?;
        match find_node(file_id, &con) {
            Ok(node) => node.evidence_id,
            Err(GetNodeError::NotFound) => return Err(ApprovalError::NotFound),
            Err(GetNodeError::DbFailure) => return Err(ApprovalError::DbFailure),
        }
    };
    let tree = state.locks.for_tree(evidence_id);
    let _guard = hold(&tree);
    let mut con = open(&state.db).map_err(|_| ApprovalError::DbFailure)?;
    let node = match find_node(file_id, &con) {
        Ok(node) => node,
        Err(GetNodeError::NotFound) => return Err(ApprovalError::NotFound),
        Err(GetNodeError::DbFailure) => return Err(ApprovalError::DbFailure),
    };
    let current = node.as_file().ok_or(ApprovalError::NotAFile)?.review.status;
    let target = decision.target_status();
    check_transition(current, target)?;
    let review = Review {
        status: target,
        reviewed_by: Some(reviewer),
        review_date: Some(now()),
        rejection_reason: match decision {
            ReviewDecision::Approve => None,
            ReviewDecision::Reject(reason) => Some(reason),
        },
    };
    let tx = con.transaction().map_err(|e| {
        log_db_error("start review transaction", &e);
        ApprovalError::DbFailure
    })?;
    let evidence_status = node_repository::update_review(file_id, &review, &tx)
        .and_then(|_| recompute_evidence_status(evidence_id, &tx))
        .map_err(|e| {
            log_db_error(&format!("record review of file {file_id}"), &e);
            ApprovalError::DbFailure
        })?;
    tx.commit().map_err(|e| {
        log_db_error(&format!("commit review of file {file_id}"), &e);
        ApprovalError::DbFailure
    })?;
    log::info!(
        "User {reviewer} moved file {file_id} from {current} to {target}, evidence {evidence_id} is now {evidence_status}"
    );
    find_node(file_id, &con)
        .map(NodeApi::from)
        .map_err(|_| ApprovalError::DbFailure)
}
