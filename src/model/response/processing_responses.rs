use rocket::serde::json::Json;

use crate::model::api::JobTicket;
use crate::model::response::BasicMessage;

#[derive(Responder)]
pub enum ReprocessResponse {
    /// the job was queued, and its outcome will show up on the file later
    #[response(status = 202, content_type = "json")]
    Accepted(Json<JobTicket>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 409, content_type = "json")]
    AlreadyProcessing(Json<BasicMessage>),
    #[response(status = 422, content_type = "json")]
    NotAFile(Json<BasicMessage>),
    #[response(status = 503, content_type = "json")]
    QueueUnavailable(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}
