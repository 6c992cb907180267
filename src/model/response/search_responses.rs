use rocket::serde::json::Json;

use crate::model::api::NodeApi;
use crate::model::response::BasicMessage;

#[derive(Responder)]
pub enum SearchFileResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<Vec<NodeApi>>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}
