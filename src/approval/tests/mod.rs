use std::thread;

use proptest::prelude::*;

use crate::approval::aggregate_status;
use crate::approval::service::{approve_file, reject_file, review_file};
use crate::approval::ReviewDecision;
use crate::model::error::approval_errors::ApprovalError;
use crate::model::node_types::{ApprovalStatus, EvidenceStatus};
use crate::repository::node_repository;
use crate::service::evidence_service;
use crate::test::*;

#[test]
fn review_folder_is_not_a_file() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let folder = create_folder(&ctx, evidence_id, "A", None);
    assert_eq!(
        Err(ApprovalError::NotAFile),
        approve_file(&ctx.state, folder, 2).map(|_| ())
    );
    assert_eq!(
        Err(ApprovalError::NotFound),
        approve_file(&ctx.state, 999, 2).map(|_| ())
    );
    cleanup();
}

#[test]
fn reject_without_reason_leaves_file_pending() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let file = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    assert_eq!(
        Err(ApprovalError::MissingReason),
        reject_file(&ctx.state, file.node.id, None, 2).map(|_| ())
    );
    assert_eq!(
        Err(ApprovalError::MissingReason),
        reject_file(&ctx.state, file.node.id, Some(" \t"), 2).map(|_| ())
    );
    let con = ctx.state.db.open_connection().unwrap();
    let stored = node_repository::get_by_id(file.node.id, &con).unwrap();
    assert_eq!(
        ApprovalStatus::Pending,
        stored.as_file().unwrap().review.status
    );
    cleanup();
}

#[test]
fn approve_after_reject_clears_reason() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let file = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    let rejected = reject_file(&ctx.state, file.node.id, Some("  expired  "), 4).unwrap();
    let attributes = rejected.file.unwrap();
    assert_eq!(Some("expired".to_string()), attributes.rejection_reason);
    assert_eq!(Some(4), attributes.reviewed_by);
    assert!(attributes.reviewed_at.is_some());
    let approved = approve_file(&ctx.state, file.node.id, 5).unwrap();
    let attributes = approved.file.unwrap();
    assert_eq!(ApprovalStatus::Approved, attributes.approval_status);
    assert_eq!(None, attributes.rejection_reason);
    assert_eq!(Some(5), attributes.reviewed_by);
    cleanup();
}

#[test]
fn same_state_review_is_invalid() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let file = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    approve_file(&ctx.state, file.node.id, 2).unwrap();
    assert_eq!(
        Err(ApprovalError::InvalidTransition {
            from: ApprovalStatus::Approved,
            to: ApprovalStatus::Approved,
        }),
        review_file(&ctx.state, file.node.id, ReviewDecision::Approve, 2).map(|_| ())
    );
    cleanup();
}

#[test]
fn concurrent_reviews_leave_consistent_status() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let files: Vec<u32> = (0..8)
        .map(|i| {
            block_on(upload(
                &ctx,
                evidence_id,
                None,
                &format!("{i}.txt"),
                &i.to_string(),
                &staff(),
            ))
            .node
            .id
        })
        .collect();
    let handles: Vec<_> = files
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let state = ctx.state.clone();
            let id = *id;
            thread::spawn(move || {
                if i % 3 == 0 {
                    reject_file(&state, id, Some("incomplete"), 2).unwrap();
                } else {
                    approve_file(&state, id, 2).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let con = ctx.state.db.open_connection().unwrap();
    let statuses = node_repository::get_file_approval_statuses(evidence_id, &con).unwrap();
    let evidence = evidence_service::get_evidence(&ctx.state.db, evidence_id).unwrap();
    assert_eq!(aggregate_status(&statuses, false), evidence.status);
    assert_eq!(EvidenceStatus::Rejected, evidence.status);
    cleanup();
}

fn approval_status() -> impl Strategy<Value = ApprovalStatus> {
    prop_oneof![
        Just(ApprovalStatus::Pending),
        Just(ApprovalStatus::Approved),
        Just(ApprovalStatus::Rejected),
    ]
}

proptest! {
    #[test]
    fn aggregate_status_follows_the_rule(
        statuses in proptest::collection::vec(approval_status(), 0..12),
        touched in any::<bool>(),
    ) {
        let approved = statuses.iter().filter(|s| **s == ApprovalStatus::Approved).count();
        let rejected = statuses.iter().filter(|s| **s == ApprovalStatus::Rejected).count();
        let expected = if rejected > 0 {
            EvidenceStatus::Rejected
        } else if !statuses.is_empty() && approved == statuses.len() {
            EvidenceStatus::Approved
        } else if approved > 0 {
            EvidenceStatus::Completed
        } else if touched {
            EvidenceStatus::InProgress
        } else {
            EvidenceStatus::New
        };
        prop_assert_eq!(expected, aggregate_status(&statuses, touched));
    }

    #[test]
    fn aggregate_status_ignores_order(statuses in proptest::collection::vec(approval_status(), 0..12)) {
        let mut reversed = statuses.clone();
        reversed.reverse();
        prop_assert_eq!(aggregate_status(&statuses, true), aggregate_status(&reversed, true));
    }
}
