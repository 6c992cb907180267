use std::time::Duration;

use reqwest::multipart::{Form, Part};

use crate::config::ProcessingConfig;
use crate::model::error::processing_errors::PipelineError;
use crate::processing::models::{ProcessingRequest, ProcessingResult};

/// the external service that turns file bytes into extracted text, a summary, and a vector index entry
#[rocket::async_trait]
pub trait ProcessingClient: Send + Sync {
    /// sends the file off for processing. A response with `success: false` is an error
    async fn process(&self, request: ProcessingRequest) -> Result<ProcessingResult, PipelineError>;

    /// removes an entry from the external vector index
    async fn delete_vector(&self, vector_id: &str) -> Result<(), PipelineError>;
}

/// talks to the processing service over http
#[derive(Debug, Clone)]
pub struct HttpProcessingClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProcessingClient {
    pub fn new(config: &ProcessingConfig) -> Result<Self, reqwest::Error> {
        let timeout = config.timeout();
        // no size limit on what we send, only on how long we wait
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn map_send_error(e: reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            PipelineError::Timeout
        } else {
            PipelineError::Transport(e.to_string())
        }
    }
}

#[rocket::async_trait]
impl ProcessingClient for HttpProcessingClient {
    async fn process(&self, request: ProcessingRequest) -> Result<ProcessingResult, PipelineError> {
        let part = Part::bytes(request.bytes)
            .file_name(request.filename.clone())
            .mime_str(&request.mime_type)
            .map_err(|e| PipelineError::Transport(format!("bad mime type: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("file_id", request.file_id.to_string())
            .text("filename", request.filename)
            .text("mime_type", request.mime_type);
        let url = format!("{}/process-file", self.base_url);
        let call = async {
            let response = self
                .client
                .post(&url)
                .multipart(form)
                .send()
                .await
                .map_err(Self::map_send_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::BadStatus(status.as_u16()));
            }
            response
                .json::<ProcessingResult>()
                .await
                .map_err(|e| PipelineError::MalformedResponse(e.to_string()))
        };
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => return Err(PipelineError::Timeout),
        };
        if result.success {
            Ok(result)
        } else {
            Err(PipelineError::Unsuccessful)
        }
    }

    async fn delete_vector(&self, vector_id: &str) -> Result<(), PipelineError> {
        let url = format!("{}/vector/{vector_id}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::BadStatus(response.status().as_u16()))
        }
    }
}
