//! Upload error types.

use psyhub_protocol::UploadStatus;

/// Errors produced by the upload manager and its backends.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transfer error: {0}")]
    Transfer(#[from] psyhub_transfer::TransferError),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("an upload for {0} is already active")]
    AlreadyActive(String),

    #[error("no file selected")]
    NoSession,

    #[error("session {identifier} is {status:?}")]
    NotActive {
        identifier: String,
        status: UploadStatus,
    },

    #[error("chunk {chunk} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        chunk: u32,
        attempts: u32,
        last_error: String,
    },

    #[error("merge incomplete: {uploaded} of {total} chunks uploaded")]
    Incomplete { uploaded: u32, total: u32 },

    #[error("merge already claimed for this session")]
    MergeAlreadyClaimed,

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("cancelled")]
    Cancelled,
}
