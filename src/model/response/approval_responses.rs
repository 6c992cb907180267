use rocket::serde::json::Json;

use crate::model::api::NodeApi;
use crate::model::response::BasicMessage;

#[derive(Responder)]
pub enum ReviewFileResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<NodeApi>),
    /// rejecting without a reason
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    /// reviewing a folder, or moving a file into the state it's already in
    #[response(status = 422, content_type = "json")]
    InvalidTransition(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}
