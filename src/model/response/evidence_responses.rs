use rocket::serde::json::Json;

use crate::model::api::{EvidenceApi, ReconcileApi, StatisticsApi};
use crate::model::response::BasicMessage;

#[derive(Responder)]
pub enum CreateEvidenceResponse {
    #[response(status = 201, content_type = "json")]
    Created(Json<EvidenceApi>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 409, content_type = "json")]
    AlreadyExists(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

/// used for both reading and touching an evidence, since both hand back the evidence
#[derive(Responder)]
pub enum GetEvidenceResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<EvidenceApi>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum GetStatisticsResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<StatisticsApi>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum ReconcileResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<ReconcileApi>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    /// the stored tree loops back on itself and can't be walked
    #[response(status = 422, content_type = "json")]
    CorruptTree(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}
