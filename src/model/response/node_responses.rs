use rocket::http::{ContentType, Header};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use tokio::io::AsyncRead;

use crate::model::api::{NodeApi, TreeNodeApi, UploadApi};
use crate::model::response::BasicMessage;

type NoContent = ();

/// the bytes of a file, streamed straight out of the blob store
pub struct FileDownload {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub content_type: ContentType,
    pub disposition: Header<'static>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for FileDownload {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'o> {
        Response::build()
            .header(self.content_type)
            .header(self.disposition)
            .streamed_body(self.reader)
            .ok()
    }
}

#[derive(Responder)]
pub enum CreateFolderResponse {
    #[response(status = 201, content_type = "json")]
    Created(Json<NodeApi>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 409, content_type = "json")]
    AlreadyExists(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum UploadFileResponse {
    #[response(status = 201, content_type = "json")]
    Created(Json<UploadApi>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum GetNodeResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<NodeApi>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum GetFolderContentsResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<Vec<NodeApi>>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum GetTreeResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<Vec<TreeNodeApi>>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum DownloadFileResponse {
    #[response(status = 200)]
    Success(FileDownload),
    /// folders can't be downloaded
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum RenameNodeResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<NodeApi>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 409, content_type = "json")]
    AlreadyExists(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum MoveNodeResponse {
    #[response(status = 200, content_type = "json")]
    Success(Json<NodeApi>),
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<BasicMessage>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    /// moving a folder into itself or one of its own descendants
    #[response(status = 422, content_type = "json")]
    InvalidMove(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}

#[derive(Responder)]
pub enum DeleteNodeResponse {
    #[response(status = 204)]
    Deleted(NoContent),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<BasicMessage>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<BasicMessage>),
    #[response(status = 409, content_type = "json")]
    NotEmpty(Json<BasicMessage>),
    #[response(status = 500, content_type = "json")]
    GenericError(Json<BasicMessage>),
}
