use std::collections::HashSet;

use crate::locks::hold;
use crate::model::api::NodeApi;
use crate::model::error::node_errors::{GetNodeError, MoveNodeError};
use crate::model::request::node_requests::MoveTarget;
use crate::repository::node_repository;
use crate::service::folder_metadata_service::{propagate, MAX_TREE_DEPTH};
use crate::service::node_service::{find_node, open};
use crate::service::log_db_error;
use crate::state::AppState;

/// result of walking up from a move target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestorCheck {
    /// the node isn't the target or any of its ancestors
    Clear,
    /// the target is the node itself or one of its descendants
    Cycle,
    /// the walk never reached the root, so the stored tree already loops
    Corrupt,
}

/// Walks the parent chain from `target_id` towards the root looking for `node_id`.
///
/// `parent_of` looks up the parent of a node. The walk stops after [`MAX_TREE_DEPTH`] steps or on a repeated id,
/// so it finishes even if the stored parent chain loops
pub fn check_ancestors<E>(
    node_id: u32,
    target_id: u32,
    mut parent_of: impl FnMut(u32) -> Result<Option<u32>, E>,
) -> Result<AncestorCheck, E> {
    let mut visited = HashSet::new();
    let mut current = Some(target_id);
    while let Some(id) = current {
        if id == node_id {
            return Ok(AncestorCheck::Cycle);
        }
        if !visited.insert(id) || visited.len() > MAX_TREE_DEPTH as usize {
            return Ok(AncestorCheck::Corrupt);
        }
        current = parent_of(id)?;
    }
    Ok(AncestorCheck::Clear)
}

/// Moves a node into another folder of the same evidence, or to the root of the evidence.
///
/// A folder can't be moved into itself or anything beneath it. The aggregates of every folder above
/// both the old and new location are recomputed afterwards
pub fn move_node(state: &AppState, id: u32, target: MoveTarget) -> Result<NodeApi, MoveNodeError> {
    let evidence_id = {
        let con = open(&state.db).map_err(|_| MoveNodeError::DbFailure)?;
        match find_node(id, &con) {
            Ok(node) => node.evidence_id,
            Err(GetNodeError::NotFound) => return Err(MoveNodeError::NodeNotFound),
            Err(GetNodeError::DbFailure) => return Err(MoveNodeError::DbFailure),
        }
    };
    let tree = state.locks.for_tree(evidence_id);
    let _guard = hold(&tree);
    let con = open(&state.db).map_err(|_| MoveNodeError::DbFailure)?;
    let node = match find_node(id, &con) {
        Ok(node) => node,
        Err(GetNodeError::NotFound) => return Err(MoveNodeError::NodeNotFound),
        Err(GetNodeError::DbFailure) => return Err(MoveNodeError::DbFailure),
    };
    let new_parent = match target {
        MoveTarget::Root => None,
        MoveTarget::Folder(target_id) => {
            if target_id == id && node.is_folder() {
                return Err(MoveNodeError::MoveToSelf);
            }
            let target = match find_node(target_id, &con) {
                Ok(target) => target,
                Err(GetNodeError::NotFound) => return Err(MoveNodeError::TargetNotFound),
                Err(GetNodeError::DbFailure) => return Err(MoveNodeError::DbFailure),
            };
            if !target.is_folder() || target.evidence_id != node.evidence_id {
                return Err(MoveNodeError::TargetNotFound);
            }
            if node.is_folder() {
                let check = check_ancestors(id, target_id, |current| {
                    node_repository::get_parent_id(current, &con)
                })
                .map_err(|e| {
                    log_db_error(&format!("walk the parents of folder {target_id}"), &e);
                    MoveNodeError::DbFailure
                })?;
                match check {
                    AncestorCheck::Clear => {}
                    AncestorCheck::Cycle => return Err(MoveNodeError::WouldCreateCycle),
                    AncestorCheck::Corrupt => {
                        log::error!(
                            "Refusing to move folder {id}: the parents of folder {target_id} loop"
                        );
                        return Err(MoveNodeError::WouldCreateCycle);
                    }
                }
            }
            Some(target_id)
        }
    };
    if new_parent == node.parent_id {
        return Ok(node.into());
    }
    node_repository::update_parent(id, new_parent, &con).map_err(|e| {
        log_db_error(&format!("move node {id} to {new_parent:?}"), &e);
        MoveNodeError::DbFailure
    })?;
    propagate(node.parent_id, &con);
    propagate(new_parent, &con);
    log::info!(
        "Moved node {id} from {:?} to {new_parent:?} in evidence {}",
        node.parent_id,
        node.evidence_id
    );
    find_node(id, &con)
        .map(NodeApi::from)
        .map_err(|_| MoveNodeError::DbFailure)
}
