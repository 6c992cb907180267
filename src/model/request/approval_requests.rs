use rocket::serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(crate = "rocket::serde")]
pub struct ReviewRequest {
    /// required when rejecting, ignored when approving
    pub reason: Option<String>,
}
