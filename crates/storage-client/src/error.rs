use psyhub_protocol::ApiError;
use psyhub_upload::UploadError;

/// Errors produced by the HTTP storage client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0} response carried no data")]
    EmptyData(&'static str),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl From<ClientError> for UploadError {
    fn from(e: ClientError) -> Self {
        UploadError::Backend(e.to_string())
    }
}
