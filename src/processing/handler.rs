use rocket::serde::json::Json;
use rocket::State;

use crate::guard::policy::forbidden_message;
use crate::guard::{Caller, Capability};
use crate::model::error::node_errors::GetNodeError;
use crate::model::error::processing_errors::DispatchError;
use crate::model::response::processing_responses::ReprocessResponse;
use crate::model::response::BasicMessage;
use crate::service::node_service;
use crate::state::AppState;

/// runs the file through content processing again, replacing whatever the last run produced
#[post("/<id>/reprocess")]
pub async fn reprocess_file(id: u32, caller: Caller, state: &State<AppState>) -> ReprocessResponse {
    match node_service::get_node_scope(&state.db, id) {
        Ok((_, evidence)) if caller.can(Capability::CanUpload, evidence.criteria_id) => {}
        Ok(_) => {
            return ReprocessResponse::Forbidden(BasicMessage::new(&forbidden_message(
                Capability::CanUpload,
            )))
        }
        Err(GetNodeError::NotFound) => {
            return ReprocessResponse::NotFound(BasicMessage::new(
                "The file with the passed id could not be found.",
            ))
        }
        Err(GetNodeError::DbFailure) => {
            return ReprocessResponse::GenericError(BasicMessage::new(
                "Failed to pull file info from database. Check server logs for details",
            ))
        }
    }
    match state.queue.dispatch(id).await {
        Ok(ticket) => ReprocessResponse::Accepted(Json::from(ticket)),
        Err(DispatchError::NotFound) => ReprocessResponse::NotFound(BasicMessage::new(
            "The file with the passed id could not be found.",
        )),
        Err(DispatchError::NotAFile) => {
            ReprocessResponse::NotAFile(BasicMessage::new("Folders cannot be processed."))
        }
        Err(DispatchError::AlreadyProcessing) => ReprocessResponse::AlreadyProcessing(
            BasicMessage::new("The file is already being processed."),
        ),
        Err(DispatchError::QueueUnavailable) => ReprocessResponse::QueueUnavailable(
            BasicMessage::new("The processing queue is unavailable. Try again later"),
        ),
        Err(DispatchError::DbFailure) => ReprocessResponse::GenericError(BasicMessage::new(
            "Failed to queue processing. Check server logs for details",
        )),
    }
}
