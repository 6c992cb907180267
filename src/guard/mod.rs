use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::Request;

pub mod policy;

pub use policy::{authorize, Capability, Role};

const USER_ID_HEADER: &str = "X-User-Id";
const ROLE_HEADER: &str = "X-User-Role";
const CRITERIA_HEADER: &str = "X-User-Criteria";

/// The authenticated user making a request. Authentication happens upstream, which forwards the
/// result to us through the `X-User-*` headers, so these values are trusted as-is
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: u32,
    pub role: Role,
    /// the criteria this user has been assigned to. Only matters for staff
    pub criteria_ids: Vec<u32>,
}

#[derive(Debug, PartialEq)]
pub enum CallerError {
    Missing,
    Invalid,
}

impl Caller {
    /// builds a caller from the raw header values.
    /// The criteria header is a comma-separated list of ids and may be left out
    pub fn from_headers(
        user_id: &str,
        role: &str,
        criteria: Option<&str>,
    ) -> Result<Caller, CallerError> {
        let user_id = user_id
            .trim()
            .parse::<u32>()
            .map_err(|_| CallerError::Invalid)?;
        let role = Role::try_from(role.trim()).map_err(|_| CallerError::Invalid)?;
        let criteria_ids = match criteria.map(str::trim) {
            None | Some("") => Vec::new(),
            Some(list) => list
                .split(',')
                .map(|id| id.trim().parse::<u32>())
                .collect::<Result<Vec<u32>, _>>()
                .map_err(|_| CallerError::Invalid)?,
        };
        Ok(Caller {
            user_id,
            role,
            criteria_ids,
        })
    }

    /// convenience for [`authorize`]
    pub fn can(&self, capability: Capability, criteria_id: u32) -> bool {
        authorize(self, capability, criteria_id)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = CallerError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = request.headers();
        let (Some(user_id), Some(role)) = (headers.get_one(USER_ID_HEADER), headers.get_one(ROLE_HEADER))
        else {
            return Outcome::Error((Status::Unauthorized, CallerError::Missing));
        };
        match Caller::from_headers(user_id, role, headers.get_one(CRITERIA_HEADER)) {
            Ok(caller) => Outcome::Success(caller),
            Err(e) => {
                log::warn!("Rejecting request with malformed caller headers: {e:?}");
                Outcome::Error((Status::Unauthorized, e))
            }
        }
    }
}
