use rocket::serde::json::Json;
use rocket::State;

use crate::guard::Caller;
use crate::model::error::node_errors::SearchFileError;
use crate::model::request::search_requests::{FileSearch, SearchFilesQuery};
use crate::model::response::search_responses::SearchFileResponse;
use crate::model::response::BasicMessage;
use crate::service::search_service;
use crate::state::AppState;

#[get("/search?<query..>")]
pub fn search_files(
    query: SearchFilesQuery,
    _caller: Caller,
    state: &State<AppState>,
) -> SearchFileResponse {
    let search = match FileSearch::try_from(query) {
        Ok(search) => search,
        Err(field) => {
            return SearchFileResponse::BadRequest(BasicMessage::new(&format!(
                "{field} must be a date like 2024-03-01 or 2024-03-01T12:30:00"
            )))
        }
    };
    match search_service::search_files(&state.db, &search) {
        Ok(nodes) => SearchFileResponse::Success(Json::from(nodes)),
        Err(SearchFileError::InvalidFilter) => SearchFileResponse::BadRequest(BasicMessage::new(
            "The lower bound of a size or date range can't be above the upper bound.",
        )),
        Err(SearchFileError::DbFailure) => SearchFileResponse::GenericError(BasicMessage::new(
            "Failed to search files. Check server logs for details",
        )),
    }
}
