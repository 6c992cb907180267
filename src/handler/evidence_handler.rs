use rocket::serde::json::Json;
use rocket::State;

use crate::guard::policy::forbidden_message;
use crate::guard::{Caller, Capability};
use crate::model::error::evidence_errors::{CreateEvidenceError, GetEvidenceError};
use crate::model::error::node_errors::{AggregateError, GetNodeError};
use crate::model::request::evidence_requests::CreateEvidenceRequest;
use crate::model::request::node_requests::CreateFolderRequest;
use crate::model::response::evidence_responses::{
    CreateEvidenceResponse, GetEvidenceResponse, GetStatisticsResponse, ReconcileResponse,
};
use crate::model::response::node_responses::{
    CreateFolderResponse, GetFolderContentsResponse, GetTreeResponse,
};
use crate::model::response::BasicMessage;
use crate::service::{evidence_service, folder_metadata_service, node_service, search_service};
use crate::state::AppState;

const EVIDENCE_NOT_FOUND: &str = "The evidence with the passed id could not be found.";
const EVIDENCE_DB_ERROR: &str =
    "Failed to pull evidence info from database. Check server logs for details";

#[post("/", data = "<request>")]
pub fn create_evidence(
    request: Json<CreateEvidenceRequest>,
    caller: Caller,
    state: &State<AppState>,
) -> CreateEvidenceResponse {
    if !caller.can(Capability::CanManageFiles, request.criteria_id) {
        return CreateEvidenceResponse::Forbidden(BasicMessage::new(&forbidden_message(
            Capability::CanManageFiles,
        )));
    }
    match evidence_service::create_evidence(&state.db, &request) {
        Ok(evidence) => CreateEvidenceResponse::Created(Json::from(evidence)),
        Err(CreateEvidenceError::InvalidCode) => CreateEvidenceResponse::BadRequest(
            BasicMessage::new("Evidence codes must look like H1.01.02.04"),
        ),
        Err(CreateEvidenceError::InvalidName) => CreateEvidenceResponse::BadRequest(
            BasicMessage::new("Evidence names must be between 1 and 500 characters"),
        ),
        Err(CreateEvidenceError::AlreadyExists) => CreateEvidenceResponse::AlreadyExists(
            BasicMessage::new("Another evidence already uses that code"),
        ),
        Err(CreateEvidenceError::DbFailure) => CreateEvidenceResponse::GenericError(
            BasicMessage::new("Failed to create evidence. Check server logs for details"),
        ),
    }
}

#[get("/<id>")]
pub fn get_evidence(id: u32, _caller: Caller, state: &State<AppState>) -> GetEvidenceResponse {
    match evidence_service::get_evidence(&state.db, id) {
        Ok(evidence) => GetEvidenceResponse::Success(Json::from(evidence)),
        Err(GetEvidenceError::NotFound) => {
            GetEvidenceResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            GetEvidenceResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
}

/// marks that someone has started working on the evidence
#[post("/<id>/touch")]
pub fn touch_evidence(id: u32, caller: Caller, state: &State<AppState>) -> GetEvidenceResponse {
    match evidence_service::get_evidence_record(&state.db, id) {
        Ok(evidence) if caller.can(Capability::CanUpload, evidence.criteria_id) => {}
        Ok(_) => {
            return GetEvidenceResponse::Forbidden(BasicMessage::new(&forbidden_message(
                Capability::CanUpload,
            )))
        }
        Err(GetEvidenceError::NotFound) => {
            return GetEvidenceResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            return GetEvidenceResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
    match evidence_service::touch_evidence(state, id) {
        Ok(evidence) => GetEvidenceResponse::Success(Json::from(evidence)),
        Err(GetEvidenceError::NotFound) => {
            GetEvidenceResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            GetEvidenceResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
}

#[get("/<id>/tree")]
pub fn get_tree(id: u32, _caller: Caller, state: &State<AppState>) -> GetTreeResponse {
    match node_service::get_tree(&state.db, id) {
        Ok(tree) => GetTreeResponse::Success(Json::from(tree)),
        Err(GetNodeError::NotFound) => {
            GetTreeResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetNodeError::DbFailure) => {
            GetTreeResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
}

/// the direct children of a folder, or of the root if no folder is passed
#[get("/<id>/contents?<folder>")]
pub fn get_folder_contents(
    id: u32,
    folder: Option<u32>,
    _caller: Caller,
    state: &State<AppState>,
) -> GetFolderContentsResponse {
    match node_service::get_folder_contents(&state.db, id, folder) {
        Ok(contents) => GetFolderContentsResponse::Success(Json::from(contents)),
        Err(GetNodeError::NotFound) => GetFolderContentsResponse::NotFound(BasicMessage::new(
            "The evidence or folder with the passed id could not be found.",
        )),
        Err(GetNodeError::DbFailure) => {
            GetFolderContentsResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
}

#[get("/<id>/statistics")]
pub fn get_statistics(id: u32, _caller: Caller, state: &State<AppState>) -> GetStatisticsResponse {
    match search_service::file_statistics(&state.db, id) {
        Ok(stats) => GetStatisticsResponse::Success(Json::from(stats)),
        Err(GetEvidenceError::NotFound) => {
            GetStatisticsResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            GetStatisticsResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
}

#[post("/<id>/folders", data = "<request>")]
pub fn create_folder(
    id: u32,
    request: Json<CreateFolderRequest>,
    caller: Caller,
    state: &State<AppState>,
) -> CreateFolderResponse {
    use crate::model::error::node_errors::CreateNodeError;
    match evidence_service::get_evidence_record(&state.db, id) {
        Ok(evidence) if caller.can(Capability::CanManageFiles, evidence.criteria_id) => {}
        Ok(_) => {
            return CreateFolderResponse::Forbidden(BasicMessage::new(&forbidden_message(
                Capability::CanManageFiles,
            )))
        }
        Err(GetEvidenceError::NotFound) => {
            return CreateFolderResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            return CreateFolderResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
    match node_service::create_folder(state, id, &request, caller.user_id) {
        Ok(folder) => CreateFolderResponse::Created(Json::from(folder)),
        Err(CreateNodeError::InvalidName) => CreateFolderResponse::BadRequest(BasicMessage::new(
            "The folder name is empty or only has characters that aren't allowed.",
        )),
        Err(CreateNodeError::InvalidParent) => CreateFolderResponse::BadRequest(
            BasicMessage::new("The parent must be an existing folder of the same evidence."),
        ),
        Err(CreateNodeError::EvidenceNotFound) => {
            CreateFolderResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(CreateNodeError::AlreadyExists) => CreateFolderResponse::AlreadyExists(
            BasicMessage::new("A folder with that name already exists in the parent folder."),
        ),
        Err(CreateNodeError::BlobFailure) | Err(CreateNodeError::DbFailure) => {
            CreateFolderResponse::GenericError(BasicMessage::new(
                "Failed to create folder. Check server logs for details",
            ))
        }
    }
}

/// rebuilds every folder aggregate in the evidence from scratch
#[post("/<id>/reconcile")]
pub fn reconcile(id: u32, caller: Caller, state: &State<AppState>) -> ReconcileResponse {
    match evidence_service::get_evidence_record(&state.db, id) {
        Ok(evidence) if caller.can(Capability::CanManageFiles, evidence.criteria_id) => {}
        Ok(_) => {
            return ReconcileResponse::Forbidden(BasicMessage::new(&forbidden_message(
                Capability::CanManageFiles,
            )))
        }
        Err(GetEvidenceError::NotFound) => {
            return ReconcileResponse::NotFound(BasicMessage::new(EVIDENCE_NOT_FOUND))
        }
        Err(GetEvidenceError::DbFailure) => {
            return ReconcileResponse::GenericError(BasicMessage::new(EVIDENCE_DB_ERROR))
        }
    }
    let tree = state.locks.for_tree(id);
    let _guard = crate::locks::hold(&tree);
    let result = node_service::open(&state.db)
        .map_err(|_| AggregateError::DbFailure)
        .and_then(|con| folder_metadata_service::reconcile_evidence(id, &con));
    match result {
        Ok(report) => ReconcileResponse::Success(Json::from(report)),
        Err(AggregateError::CorruptParentChain) => ReconcileResponse::CorruptTree(
            BasicMessage::new("Some folders of this evidence are caught in a parent loop."),
        ),
        Err(AggregateError::DbFailure) => ReconcileResponse::GenericError(BasicMessage::new(
            "Failed to reconcile folder metadata. Check server logs for details",
        )),
    }
}
