#[derive(PartialEq, Debug)]
pub enum DispatchError {
    NotFound,
    /// folders have no content to process
    NotAFile,
    /// another run for this file hasn't finished yet
    AlreadyProcessing,
    /// the job could not be handed to the queue
    QueueUnavailable,
    DbFailure,
}

/// reasons a single pipeline run fails. These never reach the caller that triggered the run,
/// they only end up in the logs and as `processStatus = failed` on the file
#[derive(PartialEq, Debug)]
pub enum PipelineError {
    /// the file's bytes could not be read back from the blob store
    BlobRead(String),
    /// the request never got a response (connection refused, dns, reset...)
    Transport(String),
    /// the processing service took longer than the configured timeout
    Timeout,
    /// the processing service answered with a non-2xx status
    BadStatus(u16),
    /// the response body wasn't the json we expect
    MalformedResponse(String),
    /// the processing service answered, but reported `success: false`
    Unsuccessful,
}
