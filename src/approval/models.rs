use crate::model::error::approval_errors::ApprovalError;
use crate::model::node_types::{ApprovalStatus, EvidenceStatus};

/// what a reviewer decided about a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    /// the reason is shown to whoever uploaded the file
    Reject(String),
}

impl ReviewDecision {
    pub fn target_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject(_) => ApprovalStatus::Rejected,
        }
    }

    /// builds a rejection, failing if the reason is missing or blank
    pub fn reject(reason: Option<&str>) -> Result<Self, ApprovalError> {
        match reason.map(str::trim) {
            Some(reason) if !reason.is_empty() => Ok(Self::Reject(reason.to_string())),
            _ => Err(ApprovalError::MissingReason),
        }
    }
}

/// checks that a file can go from `from` to `to`. Every change between different states is allowed,
/// since files can be re-reviewed in either direction. Nothing can go back to pending
pub fn check_transition(from: ApprovalStatus, to: ApprovalStatus) -> Result<(), ApprovalError> {
    use ApprovalStatus::*;
    match (from, to) {
        (Pending, Approved) | (Pending, Rejected) | (Rejected, Approved) | (Approved, Rejected) => {
            Ok(())
        }
        _ => Err(ApprovalError::InvalidTransition { from, to }),
    }
}

/// Derives an evidence's status from the approval states of every file it holds.
///
/// Any rejected file makes the evidence rejected, no matter how many are approved. Otherwise the evidence
/// is approved once every file is approved, and completed while approvals are still coming in.
/// An evidence with no files, or whose files are all still pending, is `new` until someone touches it
/// and `in_progress` after
pub fn aggregate_status(statuses: &[ApprovalStatus], touched: bool) -> EvidenceStatus {
    let untouched_status = if touched {
        EvidenceStatus::InProgress
    } else {
        EvidenceStatus::New
    };
    if statuses.is_empty() {
        return untouched_status;
    }
    if statuses.contains(&ApprovalStatus::Rejected) {
        return EvidenceStatus::Rejected;
    }
    let approved = statuses
        .iter()
        .filter(|s| **s == ApprovalStatus::Approved)
        .count();
    if approved == statuses.len() {
        EvidenceStatus::Approved
    } else if approved > 0 {
        EvidenceStatus::Completed
    } else {
        untouched_status
    }
}
