use rocket::serde::json::Json;
use rocket::State;

use crate::approval::service;
use crate::guard::policy::forbidden_message;
use crate::guard::{Caller, Capability};
use crate::model::error::approval_errors::ApprovalError;
use crate::model::error::node_errors::GetNodeError;
use crate::model::request::approval_requests::ReviewRequest;
use crate::model::response::approval_responses::ReviewFileResponse;
use crate::model::response::BasicMessage;
use crate::service::node_service;
use crate::state::AppState;

#[post("/<id>/approve")]
pub fn approve_file(id: u32, caller: Caller, state: &State<AppState>) -> ReviewFileResponse {
    if let Some(denied) = check_reviewer(id, &caller, state) {
        return denied;
    }
    map_review(service::approve_file(state, id, caller.user_id))
}

#[post("/<id>/reject", data = "<request>")]
pub fn reject_file(
    id: u32,
    request: Json<ReviewRequest>,
    caller: Caller,
    state: &State<AppState>,
) -> ReviewFileResponse {
    if let Some(denied) = check_reviewer(id, &caller, state) {
        return denied;
    }
    map_review(service::reject_file(
        state,
        id,
        request.reason.as_deref(),
        caller.user_id,
    ))
}

fn check_reviewer(id: u32, caller: &Caller, state: &AppState) -> Option<ReviewFileResponse> {
    match node_service::get_node_scope(&state.db, id) {
        Ok((_, evidence)) if caller.can(Capability::CanApprove, evidence.criteria_id) => None,
        Ok(_) => Some(ReviewFileResponse::Forbidden(BasicMessage::new(
            &forbidden_message(Capability::CanApprove),
        ))),
        Err(GetNodeError::NotFound) => Some(ReviewFileResponse::NotFound(BasicMessage::new(
            "The file with the passed id could not be found.",
        ))),
        Err(GetNodeError::DbFailure) => Some(ReviewFileResponse::GenericError(BasicMessage::new(
            "Failed to pull file info from database. Check server logs for details",
        ))),
    }
}

fn map_review(result: Result<crate::model::api::NodeApi, ApprovalError>) -> ReviewFileResponse {
    match result {
        Ok(node) => ReviewFileResponse::Success(Json::from(node)),
        Err(ApprovalError::NotFound) => ReviewFileResponse::NotFound(BasicMessage::new(
            "The file with the passed id could not be found.",
        )),
        Err(ApprovalError::MissingReason) => ReviewFileResponse::BadRequest(BasicMessage::new(
            "A reason is required to reject a file.",
        )),
        Err(ApprovalError::NotAFile) => ReviewFileResponse::InvalidTransition(BasicMessage::new(
            "Folders cannot be approved or rejected.",
        )),
        Err(ApprovalError::InvalidTransition { from, to }) => {
            ReviewFileResponse::InvalidTransition(BasicMessage::new(&format!(
                "Cannot move a file from {from} to {to}."
            )))
        }
        Err(ApprovalError::DbFailure) => ReviewFileResponse::GenericError(BasicMessage::new(
            "Failed to review file. Check server logs for details",
        )),
    }
}
