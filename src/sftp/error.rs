use crate::routing::error::RouterError;
use crate::sftp::file_requests::{RequestId, StatusCode};


#[derive(Debug, thiserror::Error)]
pub enum WriteStreamError {
    /// The server reported a failure for a request
    #[error("request {request_id} failed with status {code}: {message}")]
    ProtocolStatus {
        request_id: RequestId,
        code: u32,
        message: String,
    },

    #[error("invalid file handle")]
    InvalidHandle,

    #[error("the stream is closed")]
    Closed,

    /// The message matching a request's id is not a status response
    #[error("unexpected response to request {0}")]
    UnexpectedResponse(RequestId),

    #[error("waiting for acknowledgement failed: {0}")]
    Router(#[from] RouterError),

    #[error("sending request failed: {0:#}")]
    Request(#[source] anyhow::Error),

    #[error("invalid configuration: {0:#}")]
    Config(#[source] anyhow::Error),
}

impl WriteStreamError {
    /// the status code for [WriteStreamError::ProtocolStatus], if it is a known one
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            WriteStreamError::ProtocolStatus { code, .. } => StatusCode::try_from(*code).ok(),
            _ => None,
        }
    }
}
