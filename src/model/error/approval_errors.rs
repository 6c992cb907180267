use crate::model::node_types::ApprovalStatus;

#[derive(PartialEq, Debug)]
pub enum ApprovalError {
    NotFound,
    /// folders have no approval state
    NotAFile,
    /// rejecting a file requires a non-blank reason
    MissingReason,
    /// the file is already in the requested state
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },
    DbFailure,
}
