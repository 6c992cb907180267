use rocket::form::Form;
use rocket::http::{ContentType, Header};
use rocket::serde::json::Json;
use rocket::State;

use crate::guard::policy::forbidden_message;
use crate::guard::{Caller, Capability};
use crate::model::error::evidence_errors::GetEvidenceError;
use crate::model::error::node_errors::{
    CreateNodeError, DeleteNodeError, DownloadFileError, GetNodeError, MoveNodeError,
    UpdateNodeError,
};
use crate::model::request::node_requests::{
    MoveNodeRequest, NewUpload, RenameNodeRequest, UploadFileRequest,
};
use crate::model::response::node_responses::{
    DeleteNodeResponse, DownloadFileResponse, FileDownload, GetNodeResponse, MoveNodeResponse,
    RenameNodeResponse, UploadFileResponse,
};
use crate::model::response::BasicMessage;
use crate::service::{evidence_service, move_service, node_service};
use crate::state::AppState;

const NODE_NOT_FOUND: &str = "The file or folder with the passed id could not be found.";
const NODE_DB_ERROR: &str =
    "Failed to pull file info from database. Check server logs for details";

/// the outcome of checking whether the caller may act on a node, already mapped to a message
enum ScopeCheck {
    Allowed,
    Forbidden(Json<BasicMessage>),
    NotFound(Json<BasicMessage>),
    Failed(Json<BasicMessage>),
}

fn check_scope(id: u32, caller: &Caller, capability: Capability, state: &AppState) -> ScopeCheck {
    match node_service::get_node_scope(&state.db, id) {
        Ok((_, evidence)) if caller.can(capability, evidence.criteria_id) => ScopeCheck::Allowed,
        Ok(_) => ScopeCheck::Forbidden(BasicMessage::new(&forbidden_message(capability))),
        Err(GetNodeError::NotFound) => ScopeCheck::NotFound(BasicMessage::new(NODE_NOT_FOUND)),
        Err(GetNodeError::DbFailure) => ScopeCheck::Failed(BasicMessage::new(NODE_DB_ERROR)),
    }
}

/// accepts a file via multipart form and stores it in the evidence tree.
/// Content processing happens in the background, the response only carries the job ticket
#[post("/<id>/files", data = "<request>")]
pub async fn upload_file(
    id: u32,
    request: Form<UploadFileRequest<'_>>,
    caller: Caller,
    state: &State<AppState>,
) -> UploadFileResponse {
    match evidence_service::get_evidence_record(&state.db, id) {
        Ok(evidence) if caller.can(Capability::CanUpload, evidence.criteria_id) => {}
        Ok(_) => {
            return UploadFileResponse::Forbidden(BasicMessage::new(&forbidden_message(
                Capability::CanUpload,
            )))
        }
        Err(GetEvidenceError::NotFound) => {
            return UploadFileResponse::NotFound(BasicMessage::new(
                "The evidence with the passed id could not be found.",
            ))
        }
        Err(GetEvidenceError::DbFailure) => {
            return UploadFileResponse::GenericError(BasicMessage::new(NODE_DB_ERROR))
        }
    }
    let Ok(parent_id) = request.parent_id() else {
        return UploadFileResponse::BadRequest(BasicMessage::new(
            "parentFolderId must be a folder id or root",
        ));
    };
    let Some(name) = request
        .file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
    else {
        return UploadFileResponse::BadRequest(BasicMessage::new("file name is missing"));
    };
    let mime_type = request
        .file
        .content_type()
        .map(|ct| ct.to_string())
        .unwrap_or_else(|| ContentType::Binary.to_string());
    let upload = NewUpload {
        evidence_id: id,
        parent_id,
        name,
        mime_type,
    };
    let reader = match request.file.open().await {
        Ok(reader) => reader,
        Err(e) => {
            log::error!("Failed to open uploaded temp file. Exception is {e:?}");
            return UploadFileResponse::GenericError(BasicMessage::new(
                "Failed to read the uploaded file. Check server logs for details",
            ));
        }
    };
    let mut reader = Box::pin(reader);
    match node_service::upload_file(state, upload, &mut reader, &caller).await {
        Ok(uploaded) => UploadFileResponse::Created(Json::from(uploaded)),
        Err(CreateNodeError::InvalidName) => UploadFileResponse::BadRequest(BasicMessage::new(
            "The file name is empty or only has characters that aren't allowed.",
        )),
        Err(CreateNodeError::InvalidParent) => UploadFileResponse::BadRequest(
            BasicMessage::new("The parent must be an existing folder of the same evidence."),
        ),
        Err(CreateNodeError::EvidenceNotFound) => UploadFileResponse::NotFound(
            BasicMessage::new("The evidence with the passed id could not be found."),
        ),
        Err(CreateNodeError::AlreadyExists)
        | Err(CreateNodeError::BlobFailure)
        | Err(CreateNodeError::DbFailure) => UploadFileResponse::GenericError(BasicMessage::new(
            "Failed to save file. Check server logs for details",
        )),
    }
}

#[get("/<id>")]
pub fn get_node(id: u32, _caller: Caller, state: &State<AppState>) -> GetNodeResponse {
    match node_service::get_node(&state.db, id) {
        Ok(node) => GetNodeResponse::Success(Json::from(node)),
        Err(GetNodeError::NotFound) => GetNodeResponse::NotFound(BasicMessage::new(NODE_NOT_FOUND)),
        Err(GetNodeError::DbFailure) => {
            GetNodeResponse::GenericError(BasicMessage::new(NODE_DB_ERROR))
        }
    }
}

#[get("/<id>/download")]
pub async fn download_file(id: u32, _caller: Caller, state: &State<AppState>) -> DownloadFileResponse {
    match node_service::download_file(state, id).await {
        Ok(download) => {
            let content_type =
                ContentType::parse_flexible(&download.mime_type).unwrap_or(ContentType::Binary);
            let disposition = Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", download.name.replace('"', "")),
            );
            DownloadFileResponse::Success(FileDownload {
                reader: download.reader,
                content_type,
                disposition,
            })
        }
        Err(DownloadFileError::NotFound) => {
            DownloadFileResponse::NotFound(BasicMessage::new(NODE_NOT_FOUND))
        }
        Err(DownloadFileError::NotAFile) => {
            DownloadFileResponse::BadRequest(BasicMessage::new("Folders cannot be downloaded."))
        }
        Err(DownloadFileError::BlobFailure) | Err(DownloadFileError::DbFailure) => {
            DownloadFileResponse::GenericError(BasicMessage::new(
                "Failed to read file. Check server logs for details",
            ))
        }
    }
}

/// only folders can be renamed
#[put("/<id>/name", data = "<request>")]
pub fn rename_node(
    id: u32,
    request: Json<RenameNodeRequest>,
    caller: Caller,
    state: &State<AppState>,
) -> RenameNodeResponse {
    match check_scope(id, &caller, Capability::CanManageFiles, state) {
        ScopeCheck::Allowed => {}
        ScopeCheck::Forbidden(message) => return RenameNodeResponse::Forbidden(message),
        ScopeCheck::NotFound(message) => return RenameNodeResponse::NotFound(message),
        ScopeCheck::Failed(message) => return RenameNodeResponse::GenericError(message),
    }
    match node_service::rename_node(state, id, &request) {
        Ok(node) => RenameNodeResponse::Success(Json::from(node)),
        Err(UpdateNodeError::NotFound) => {
            RenameNodeResponse::NotFound(BasicMessage::new(NODE_NOT_FOUND))
        }
        Err(UpdateNodeError::NotAFolder) => {
            RenameNodeResponse::BadRequest(BasicMessage::new("Only folders can be renamed."))
        }
        Err(UpdateNodeError::InvalidName) => RenameNodeResponse::BadRequest(BasicMessage::new(
            "The folder name is empty or only has characters that aren't allowed.",
        )),
        Err(UpdateNodeError::AlreadyExists) => RenameNodeResponse::AlreadyExists(
            BasicMessage::new("A folder with that name already exists in the parent folder."),
        ),
        Err(UpdateNodeError::DbFailure) => RenameNodeResponse::GenericError(BasicMessage::new(
            "Failed to rename folder. Check server logs for details",
        )),
    }
}

/// moves a file or folder to another folder of the same evidence, or to the evidence root
#[put("/<id>/parent", data = "<request>")]
pub fn move_node(
    id: u32,
    request: Json<MoveNodeRequest>,
    caller: Caller,
    state: &State<AppState>,
) -> MoveNodeResponse {
    match check_scope(id, &caller, Capability::CanManageFiles, state) {
        ScopeCheck::Allowed => {}
        ScopeCheck::Forbidden(message) => return MoveNodeResponse::Forbidden(message),
        ScopeCheck::NotFound(message) => return MoveNodeResponse::NotFound(message),
        ScopeCheck::Failed(message) => return MoveNodeResponse::GenericError(message),
    }
    let Some(target) = request.target() else {
        return MoveNodeResponse::BadRequest(BasicMessage::new(
            "targetFolderId must be a folder id or root",
        ));
    };
    match move_service::move_node(state, id, target) {
        Ok(node) => MoveNodeResponse::Success(Json::from(node)),
        Err(MoveNodeError::NodeNotFound) => {
            MoveNodeResponse::NotFound(BasicMessage::new(NODE_NOT_FOUND))
        }
        Err(MoveNodeError::TargetNotFound) => MoveNodeResponse::NotFound(BasicMessage::new(
            "The target folder could not be found in this evidence.",
        )),
        Err(MoveNodeError::MoveToSelf) => {
            MoveNodeResponse::InvalidMove(BasicMessage::new("A folder cannot be moved into itself."))
        }
        Err(MoveNodeError::WouldCreateCycle) => MoveNodeResponse::InvalidMove(BasicMessage::new(
            "A folder cannot be moved into one of its own subfolders.",
        )),
        Err(MoveNodeError::DbFailure) => MoveNodeResponse::GenericError(BasicMessage::new(
            "Failed to move node. Check server logs for details",
        )),
    }
}

#[delete("/<id>")]
pub async fn delete_node(id: u32, caller: Caller, state: &State<AppState>) -> DeleteNodeResponse {
    match check_scope(id, &caller, Capability::CanDelete, state) {
        ScopeCheck::Allowed => {}
        ScopeCheck::Forbidden(message) => return DeleteNodeResponse::Forbidden(message),
        ScopeCheck::NotFound(message) => return DeleteNodeResponse::NotFound(message),
        ScopeCheck::Failed(message) => return DeleteNodeResponse::GenericError(message),
    }
    match node_service::delete_node(state, id).await {
        Ok(()) => DeleteNodeResponse::Deleted(()),
        Err(DeleteNodeError::NotFound) => {
            DeleteNodeResponse::NotFound(BasicMessage::new(NODE_NOT_FOUND))
        }
        Err(DeleteNodeError::NotEmpty) => DeleteNodeResponse::NotEmpty(BasicMessage::new(
            "The folder still has files or folders in it.",
        )),
        Err(DeleteNodeError::DbFailure) => DeleteNodeResponse::GenericError(BasicMessage::new(
            "Failed to delete node. Check server logs for details",
        )),
    }
}
