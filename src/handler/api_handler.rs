use rocket::serde::json::Json;

use crate::model::response::api_responses::VersionResponse;

pub static API_VERSION_NUMBER: &str = "1.0.0";

#[get("/version")]
pub fn api_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: API_VERSION_NUMBER.to_string(),
    })
}
