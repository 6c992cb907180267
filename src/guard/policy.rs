use std::fmt::{Display, Formatter};

/// what a user is allowed to do in general. Staff are further limited to the criteria they're assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

/// every permission an operation can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// add files to an evidence tree, and re-run processing on them
    CanUpload,
    /// approve or reject files
    CanApprove,
    /// create, rename, and move nodes, and manage evidence records
    CanManageFiles,
    CanDelete,
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            other => Err(format!("{other} is not a valid role")),
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CanUpload => "upload files",
            Self::CanApprove => "approve files",
            Self::CanManageFiles => "manage files",
            Self::CanDelete => "delete files",
        };
        write!(f, "{name}")
    }
}

/// decides whether `caller` holds `capability` for evidence belonging to `criteria_id`.
///
/// admins and managers hold everything everywhere. Staff can never approve,
/// and everything else is limited to the criteria they've been assigned to
pub fn authorize(caller: &super::Caller, capability: Capability, criteria_id: u32) -> bool {
    match caller.role {
        Role::Admin | Role::Manager => true,
        Role::Staff => match capability {
            Capability::CanApprove => false,
            Capability::CanUpload | Capability::CanManageFiles | Capability::CanDelete => {
                caller.criteria_ids.contains(&criteria_id)
            }
        },
    }
}

/// the message sent back when [`authorize`] says no
pub fn forbidden_message(capability: Capability) -> String {
    format!("You do not have permission to {capability} for this evidence")
}
