use rocket::serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct CreateEvidenceRequest {
    /// e.g. `H1.01.02.04`. Case-insensitive, stored upper case
    pub code: String,
    pub name: String,
    #[serde(rename = "criteriaId")]
    pub criteria_id: u32,
}
