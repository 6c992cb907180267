use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use crate::approval::service::{approve_file, reject_file};
use crate::blob::BlobStore;
use crate::model::error::node_errors::{
    AggregateError, CreateNodeError, DeleteNodeError, MoveNodeError, UpdateNodeError,
};
use crate::model::node_types::{ApprovalStatus, EvidenceStatus};
use crate::model::repository::{NewFile, Node, NodeKind, Review};
use crate::model::request::node_requests::{CreateFolderRequest, MoveTarget, RenameNodeRequest};
use crate::model::request::search_requests::FileSearch;
use crate::repository::node_repository;
use crate::service::folder_metadata_service::{recompute_path, reconcile_evidence};
use crate::service::{evidence_service, move_service, node_service, now, search_service};
use crate::test::*;

fn node(ctx: &TestContext, id: u32) -> Node {
    let con = ctx.state.db.open_connection().unwrap();
    node_repository::get_by_id(id, &con).unwrap()
}

fn folder_counts(ctx: &TestContext, id: u32) -> (u64, u64) {
    let folder = node(ctx, id);
    let metadata = folder.as_folder().unwrap();
    (metadata.file_count, metadata.total_size)
}

fn evidence_status(ctx: &TestContext, id: u32) -> EvidenceStatus {
    evidence_service::get_evidence(&ctx.state.db, id)
        .unwrap()
        .status
}

#[test]
fn evidence_lifecycle_new_to_approved() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    assert_eq!(EvidenceStatus::New, evidence_status(&ctx, evidence_id));
    evidence_service::touch_evidence(&ctx.state, evidence_id).unwrap();
    assert_eq!(EvidenceStatus::InProgress, evidence_status(&ctx, evidence_id));
    let file = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    assert_eq!(EvidenceStatus::InProgress, evidence_status(&ctx, evidence_id));
    approve_file(&ctx.state, file.node.id, 2).unwrap();
    assert_eq!(EvidenceStatus::Approved, evidence_status(&ctx, evidence_id));
    cleanup();
}

#[test]
fn rejection_dominates_evidence_status() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let first = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    let second = block_on(upload(&ctx, evidence_id, None, "b.txt", "b", &staff()));
    approve_file(&ctx.state, first.node.id, 2).unwrap();
    assert_eq!(EvidenceStatus::Completed, evidence_status(&ctx, evidence_id));
    reject_file(&ctx.state, second.node.id, Some("blurry scan"), 2).unwrap();
    assert_eq!(EvidenceStatus::Rejected, evidence_status(&ctx, evidence_id));
    // a rejected file can still be approved after it's fixed
    approve_file(&ctx.state, second.node.id, 2).unwrap();
    assert_eq!(EvidenceStatus::Approved, evidence_status(&ctx, evidence_id));
    cleanup();
}

#[test]
fn deleting_rejected_file_clears_rejection() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let good = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &staff()));
    let bad = block_on(upload(&ctx, evidence_id, None, "b.txt", "b", &staff()));
    approve_file(&ctx.state, good.node.id, 2).unwrap();
    reject_file(&ctx.state, bad.node.id, Some("wrong document"), 2).unwrap();
    block_on(node_service::delete_node(&ctx.state, bad.node.id)).unwrap();
    assert_eq!(EvidenceStatus::Approved, evidence_status(&ctx, evidence_id));
    cleanup();
}

#[test]
fn admin_upload_is_approved_immediately() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let file = block_on(upload(&ctx, evidence_id, None, "a.txt", "a", &admin()));
    let attributes = file.node.file.unwrap();
    assert_eq!(ApprovalStatus::Approved, attributes.approval_status);
    assert_eq!(Some(admin().user_id), attributes.reviewed_by);
    assert_eq!(EvidenceStatus::Approved, evidence_status(&ctx, evidence_id));
    cleanup();
}

#[test]
fn upload_updates_every_ancestor() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    let c = create_folder(&ctx, evidence_id, "C", Some(b));
    block_on(upload(&ctx, evidence_id, Some(c), "x.txt", "12345", &staff()));
    block_on(upload(&ctx, evidence_id, Some(a), "y.txt", "12", &staff()));
    assert_eq!((1, 5), folder_counts(&ctx, c));
    assert_eq!((1, 5), folder_counts(&ctx, b));
    assert_eq!((2, 7), folder_counts(&ctx, a));
    cleanup();
}

#[test]
fn upload_to_folder_of_other_evidence_fails() {
    let ctx = init_context();
    let first = create_evidence(&ctx, "H1.01.01.01");
    let second = create_evidence(&ctx, "H1.01.01.02");
    let folder = create_folder(&ctx, first, "A", None);
    let upload = crate::model::request::node_requests::NewUpload {
        evidence_id: second,
        parent_id: Some(folder),
        name: "x.txt".to_string(),
        mime_type: "text/plain".to_string(),
    };
    let mut reader = std::io::Cursor::new(b"x".to_vec());
    let res = block_on(node_service::upload_file(
        &ctx.state,
        upload,
        &mut reader,
        &staff(),
    ));
    assert_eq!(Err(CreateNodeError::InvalidParent), res.map(|_| ()));
    assert_eq!(0, ctx.blobs.len());
    cleanup();
}

#[test]
fn create_folder_rejects_duplicate_names_ignoring_case() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    create_folder(&ctx, evidence_id, "Minutes", None);
    let request = CreateFolderRequest {
        name: "minutes".to_string(),
        parent_id: None,
    };
    assert_eq!(
        Err(CreateNodeError::AlreadyExists),
        node_service::create_folder(&ctx.state, evidence_id, &request, 2).map(|_| ())
    );
    let request = CreateFolderRequest {
        name: "../".to_string(),
        parent_id: None,
    };
    assert_eq!(
        Err(CreateNodeError::InvalidName),
        node_service::create_folder(&ctx.state, evidence_id, &request, 2).map(|_| ())
    );
    cleanup();
}

#[test]
fn rename_only_applies_to_folders() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    create_folder(&ctx, evidence_id, "B", None);
    let file = block_on(upload(&ctx, evidence_id, None, "x.txt", "x", &staff()));
    let rename = |name: &str| RenameNodeRequest {
        name: name.to_string(),
    };
    assert_eq!(
        Err(UpdateNodeError::AlreadyExists),
        node_service::rename_node(&ctx.state, a, &rename("b")).map(|_| ())
    );
    assert_eq!(
        Err(UpdateNodeError::NotAFolder),
        node_service::rename_node(&ctx.state, file.node.id, &rename("y.txt")).map(|_| ())
    );
    let renamed = node_service::rename_node(&ctx.state, a, &rename("a")).unwrap();
    assert_eq!("a", renamed.name);
    cleanup();
}

#[test]
fn move_into_descendant_is_a_cycle() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    let c = create_folder(&ctx, evidence_id, "C", Some(b));
    assert_eq!(
        Err(MoveNodeError::WouldCreateCycle),
        move_service::move_node(&ctx.state, a, MoveTarget::Folder(c)).map(|_| ())
    );
    assert_eq!(
        Err(MoveNodeError::MoveToSelf),
        move_service::move_node(&ctx.state, a, MoveTarget::Folder(a)).map(|_| ())
    );
    // the tree is untouched
    assert_eq!(None, node(&ctx, a).parent_id);
    assert_eq!(Some(a), node(&ctx, b).parent_id);
    cleanup();
}

#[test]
fn move_updates_old_and_new_ancestors() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    let d = create_folder(&ctx, evidence_id, "D", None);
    let file = block_on(upload(&ctx, evidence_id, Some(b), "x.txt", "1234", &staff()));
    assert_eq!((1, 4), folder_counts(&ctx, a));
    let moved = move_service::move_node(&ctx.state, b, MoveTarget::Folder(d)).unwrap();
    assert_eq!(Some(d), moved.parent_folder);
    assert_eq!((0, 0), folder_counts(&ctx, a));
    assert_eq!((1, 4), folder_counts(&ctx, d));
    move_service::move_node(&ctx.state, file.node.id, MoveTarget::Root).unwrap();
    assert_eq!((0, 0), folder_counts(&ctx, d));
    assert_eq!((0, 0), folder_counts(&ctx, b));
    cleanup();
}

#[test]
fn move_to_current_parent_changes_nothing() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    let moved = move_service::move_node(&ctx.state, b, MoveTarget::Folder(a)).unwrap();
    assert_eq!(Some(a), moved.parent_folder);
    cleanup();
}

#[test]
fn move_across_evidence_is_not_found() {
    let ctx = init_context();
    let first = create_evidence(&ctx, "H1.01.01.01");
    let second = create_evidence(&ctx, "H1.01.01.02");
    let a = create_folder(&ctx, first, "A", None);
    let other = create_folder(&ctx, second, "B", None);
    assert_eq!(
        Err(MoveNodeError::TargetNotFound),
        move_service::move_node(&ctx.state, a, MoveTarget::Folder(other)).map(|_| ())
    );
    assert_eq!(
        Err(MoveNodeError::NodeNotFound),
        move_service::move_node(&ctx.state, 999, MoveTarget::Root).map(|_| ())
    );
    cleanup();
}

#[test]
fn delete_non_empty_folder_fails() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    block_on(upload(&ctx, evidence_id, Some(a), "x.txt", "x", &staff()));
    assert_eq!(
        Err(DeleteNodeError::NotEmpty),
        block_on(node_service::delete_node(&ctx.state, a))
    );
    assert_eq!(
        Err(DeleteNodeError::NotFound),
        block_on(node_service::delete_node(&ctx.state, 999))
    );
    cleanup();
}

#[test]
fn delete_file_keeps_shared_blob() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let first = block_on(upload(&ctx, evidence_id, Some(a), "x.txt", "same", &staff()));
    let second = block_on(upload(&ctx, evidence_id, None, "y.txt", "same", &staff()));
    assert_eq!(1, ctx.blobs.len());
    block_on(node_service::delete_node(&ctx.state, first.node.id)).unwrap();
    assert_eq!(1, ctx.blobs.len());
    assert_eq!((0, 0), folder_counts(&ctx, a));
    block_on(node_service::delete_node(&ctx.state, second.node.id)).unwrap();
    assert_eq!(0, ctx.blobs.len());
    cleanup();
}

#[test]
fn delete_waits_for_upload_sharing_its_blob() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    block_on(async {
        let first = upload(&ctx, evidence_id, None, "x.txt", "same bytes", &staff()).await;
        // a second upload of the same bytes, committed but without its row yet
        let mut reader: &[u8] = b"same bytes";
        let staged = ctx.state.blobs.stage(&mut reader).await.unwrap();
        let guard = ctx.state.blob_locks.lock(&staged.handle).await;
        let stored = ctx.state.blobs.commit(staged).await.unwrap();
        let delete = node_service::delete_node(&ctx.state, first.node.id);
        tokio::pin!(delete);
        let waited = tokio::time::timeout(Duration::from_millis(50), &mut delete).await;
        assert!(waited.is_err(), "delete finished while the blob was locked");
        let second = {
            let con = ctx.state.db.open_connection().unwrap();
            let file = NewFile {
                evidence_id,
                parent_id: None,
                name: "y.txt".to_string(),
                uploaded_by: 3,
                upload_date: now(),
                size: stored.size,
                mime_type: "text/plain".to_string(),
                extension: ".txt".to_string(),
                storage_handle: stored.handle.clone(),
                review: Review::pending(),
            };
            node_repository::create_file(&file, &con).unwrap()
        };
        drop(guard);
        delete.await.unwrap();
        assert!(ctx.blobs.contains(&stored.handle));
        assert!(node_service::download_file(&ctx.state, second).await.is_ok());
    });
    cleanup();
}

#[test]
fn delete_processed_file_removes_vector() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let file = block_on(upload(&ctx, evidence_id, None, "x.txt", "x", &staff()));
    block_on(run_jobs(&ctx));
    block_on(node_service::delete_node(&ctx.state, file.node.id)).unwrap();
    assert_eq!(
        vec![format!("vec-{}", file.node.id)],
        ctx.processor.deleted_vectors()
    );
    cleanup();
}

#[test]
fn reconcile_repairs_stale_aggregates() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    block_on(upload(&ctx, evidence_id, Some(b), "x.txt", "abc", &staff()));
    let con = ctx.state.db.open_connection().unwrap();
    con.execute(
        "update Nodes set fileCount = 40, totalSize = 9 where type = 'folder'",
        [],
    )
    .unwrap();
    let report = reconcile_evidence(evidence_id, &con).unwrap();
    assert_eq!(2, report.folders_checked);
    assert_eq!(2, report.folders_repaired);
    assert_eq!((1, 3), folder_counts(&ctx, a));
    assert_eq!((1, 3), folder_counts(&ctx, b));
    let report = reconcile_evidence(evidence_id, &con).unwrap();
    assert_eq!(0, report.folders_repaired);
    cleanup();
}

#[test]
fn looping_parent_chain_is_detected() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    let b = create_folder(&ctx, evidence_id, "B", Some(a));
    let con = ctx.state.db.open_connection().unwrap();
    node_repository::update_parent(a, Some(b), &con).unwrap();
    assert_eq!(Err(AggregateError::CorruptParentChain), recompute_path(Some(a), &con));
    assert_eq!(
        Err(AggregateError::CorruptParentChain),
        reconcile_evidence(evidence_id, &con)
    );
    // a move that would have to walk the loop is refused instead of hanging
    let c = create_folder(&ctx, evidence_id, "C", None);
    assert_eq!(
        Err(MoveNodeError::WouldCreateCycle),
        move_service::move_node(&ctx.state, c, MoveTarget::Folder(a)).map(|_| ())
    );
    cleanup();
}

#[test]
fn statistics_count_files_and_folders() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let a = create_folder(&ctx, evidence_id, "A", None);
    block_on(upload(&ctx, evidence_id, Some(a), "x.txt", "abcd", &staff()));
    block_on(upload(&ctx, evidence_id, None, "y.txt", "ab", &staff()));
    let stats = search_service::file_statistics(&ctx.state.db, evidence_id).unwrap();
    assert_eq!(2, stats.total_files);
    assert_eq!(1, stats.total_folders);
    assert_eq!(6, stats.total_size);
    assert_eq!(1, stats.type_stats.len());
    assert_eq!("text/plain", stats.type_stats[0].mime_type);
    assert_eq!(2, stats.type_stats[0].count);
    cleanup();
}

#[test]
fn search_filters_combine() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    block_on(upload(&ctx, evidence_id, None, "small.txt", "a", &staff()));
    block_on(upload(&ctx, evidence_id, None, "large.txt", "aaaaaaaaaa", &admin()));
    create_folder(&ctx, evidence_id, "folder", None);
    let search = FileSearch {
        evidence_id: Some(evidence_id),
        min_size: Some(5),
        ..Default::default()
    };
    let found = search_service::search_files(&ctx.state.db, &search).unwrap();
    assert_eq!(vec!["large.txt".to_string()], names(&found));
    let search = FileSearch {
        uploaded_by: Some(staff().user_id),
        file_type: Some("text".to_string()),
        ..Default::default()
    };
    let found = search_service::search_files(&ctx.state.db, &search).unwrap();
    assert_eq!(vec!["small.txt".to_string()], names(&found));
    let search = FileSearch {
        file_type: Some("folder".to_string()),
        ..Default::default()
    };
    let found = search_service::search_files(&ctx.state.db, &search).unwrap();
    assert_eq!(vec!["folder".to_string()], names(&found));
    cleanup();
}

#[test]
fn keyword_search_ignores_case_of_any_script() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    block_on(upload(&ctx, evidence_id, None, "Biên bản họp.pdf", "minutes", &staff()));
    block_on(upload(&ctx, evidence_id, None, "100% done.txt", "done", &staff()));
    let search_for = |keyword: &str| {
        let search = FileSearch {
            evidence_id: Some(evidence_id),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        };
        names(&search_service::search_files(&ctx.state.db, &search).unwrap())
    };
    assert_eq!(vec!["Biên bản họp.pdf".to_string()], search_for("BIÊN BẢN"));
    assert_eq!(vec!["Biên bản họp.pdf".to_string()], search_for("biên bản"));
    assert_eq!(vec!["100% done.txt".to_string()], search_for("%"));
    assert!(search_for("_").is_empty());
    cleanup();
}

#[test]
fn concurrent_opposite_moves_never_build_a_cycle() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    for round in 0..12 {
        let a = create_folder(&ctx, evidence_id, &format!("A{round}"), None);
        let b = create_folder(&ctx, evidence_id, &format!("B{round}"), None);
        block_on(upload(&ctx, evidence_id, Some(a), &format!("a{round}.txt"), "aaa", &staff()));
        block_on(upload(&ctx, evidence_id, Some(b), &format!("b{round}.txt"), "bb", &staff()));
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [(a, b), (b, a)]
            .into_iter()
            .map(|(id, target)| {
                let state = ctx.state.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    move_service::move_node(&state, id, MoveTarget::Folder(target))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(1, results.iter().filter(|r| r.is_ok()).count());
        assert!(results.contains(&Err(MoveNodeError::WouldCreateCycle)));
    }
    assert_eq!(Ok(()), tree_problems(&ctx, evidence_id));
    cleanup();
}

#[test]
fn concurrent_move_and_delete_of_same_file() {
    let ctx = init_context();
    let evidence_id = create_evidence(&ctx, "H1.01.01.01");
    let source = create_folder(&ctx, evidence_id, "source", None);
    let target = create_folder(&ctx, evidence_id, "target", None);
    for round in 0..12 {
        let file = block_on(upload(
            &ctx,
            evidence_id,
            Some(source),
            &format!("{round}.txt"),
            "contents",
            &staff(),
        ))
        .node
        .id;
        let barrier = Arc::new(Barrier::new(2));
        let mover = {
            let state = ctx.state.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                move_service::move_node(&state, file, MoveTarget::Folder(target))
            })
        };
        let deleter = {
            let state = ctx.state.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                block_on(node_service::delete_node(&state, file))
            })
        };
        let moved = mover.join().unwrap();
        assert!(
            moved.is_ok() || moved == Err(MoveNodeError::NodeNotFound),
            "unexpected move result {moved:?}"
        );
        assert_eq!(Ok(()), deleter.join().unwrap());
        assert_eq!((0, 0), folder_counts(&ctx, source));
        assert_eq!((0, 0), folder_counts(&ctx, target));
    }
    assert_eq!(Ok(()), tree_problems(&ctx, evidence_id));
    cleanup();
}

fn names(nodes: &[crate::model::api::NodeApi]) -> Vec<String> {
    nodes.iter().map(|n| n.name.clone()).collect()
}

/// a random structural change. Indexes pick from whatever nodes exist when the change is applied
#[derive(Debug, Clone)]
enum TreeOp {
    Folder { parent: Option<usize> },
    File { parent: Option<usize>, size: usize },
    Move { node: usize, target: Option<usize> },
    Delete { node: usize },
}

fn tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        proptest::option::of(0usize..16).prop_map(|parent| TreeOp::Folder { parent }),
        (proptest::option::of(0usize..16), 0usize..64)
            .prop_map(|(parent, size)| TreeOp::File { parent, size }),
        (0usize..16, proptest::option::of(0usize..16))
            .prop_map(|(node, target)| TreeOp::Move { node, target }),
        (0usize..16).prop_map(|node| TreeOp::Delete { node }),
    ]
}

fn apply(ctx: &TestContext, evidence_id: u32, op: &TreeOp, folders: &mut Vec<u32>, all: &mut Vec<u32>) {
    let pick = |ids: &Vec<u32>, index: Option<usize>| -> Option<u32> {
        match index {
            Some(i) if !ids.is_empty() => Some(ids[i % ids.len()]),
            _ => None,
        }
    };
    match op {
        TreeOp::Folder { parent } => {
            let request = CreateFolderRequest {
                name: format!("folder {}", all.len()),
                parent_id: pick(folders, *parent),
            };
            if let Ok(folder) = node_service::create_folder(&ctx.state, evidence_id, &request, 2) {
                folders.push(folder.id);
                all.push(folder.id);
            }
        }
        TreeOp::File { parent, size } => {
            let contents = "x".repeat(*size);
            let file = block_on(upload(
                ctx,
                evidence_id,
                pick(folders, *parent),
                &format!("file {}.txt", all.len()),
                &contents,
                &staff(),
            ));
            all.push(file.node.id);
        }
        TreeOp::Move { node, target } => {
            if let Some(id) = pick(all, Some(*node)) {
                let target = match pick(folders, *target) {
                    Some(folder) => MoveTarget::Folder(folder),
                    None => MoveTarget::Root,
                };
                // cycles are expected to be refused, everything else should go through
                let _ = move_service::move_node(&ctx.state, id, target);
            }
        }
        TreeOp::Delete { node } => {
            if let Some(id) = pick(all, Some(*node)) {
                if block_on(node_service::delete_node(&ctx.state, id)).is_ok() {
                    all.retain(|n| *n != id);
                    folders.retain(|n| *n != id);
                }
            }
        }
    }
}

/// file count and size of everything beneath `id`, counted the slow way
fn count_beneath(id: u32, nodes: &HashMap<u32, Node>) -> (u64, u64) {
    nodes
        .values()
        .filter(|n| n.parent_id == Some(id))
        .map(|child| match &child.kind {
            NodeKind::File(file) => (1, file.size),
            NodeKind::Folder(_) => count_beneath(child.id, nodes),
        })
        .fold((0, 0), |(count, size), (c, s)| (count + c, size + s))
}

/// checks every parent chain reaches the root and every folder's aggregate matches a full recount
fn tree_problems(ctx: &TestContext, evidence_id: u32) -> Result<(), String> {
    let con = ctx.state.db.open_connection().unwrap();
    let nodes: HashMap<u32, Node> = node_repository::get_nodes_for_evidence(evidence_id, &con)
        .unwrap()
        .into_iter()
        .map(|n| (n.id, n))
        .collect();
    for node in nodes.values() {
        // every chain reaches the root within the number of nodes
        let mut current = node.parent_id;
        let mut steps = 0;
        while let Some(parent) = current {
            steps += 1;
            if steps > nodes.len() {
                return Err(format!("node {} is in a parent loop", node.id));
            }
            current = nodes[&parent].parent_id;
        }
        if let NodeKind::Folder(metadata) = &node.kind {
            let counted = count_beneath(node.id, &nodes);
            if counted != (metadata.file_count, metadata.total_size) {
                return Err(format!(
                    "folder {} caches {:?} but holds {counted:?}",
                    node.id,
                    (metadata.file_count, metadata.total_size)
                ));
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_changes_keep_tree_acyclic_and_aggregates_exact(ops in proptest::collection::vec(tree_op(), 1..24)) {
        let ctx = init_context();
        let evidence_id = create_evidence(&ctx, "H1.01.01.01");
        let mut folders = Vec::new();
        let mut all = Vec::new();
        for op in &ops {
            apply(&ctx, evidence_id, op, &mut folders, &mut all);
        }
        prop_assert_eq!(Ok(()), tree_problems(&ctx, evidence_id));
        cleanup();
    }
}
