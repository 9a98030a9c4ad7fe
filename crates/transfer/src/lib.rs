//! Chunked file transfer primitives: planning, reading and session state.
//!
//! Everything here is transport-agnostic. The upload manager in
//! `psyhub-upload` drives these types against a storage backend.

mod chunked;
mod mime;
mod planner;
mod progress;
mod types;
mod validation;

pub use chunked::{SourceFile, read_file_range};
pub use mime::guess_media_type;
pub use planner::{ChunkPlan, ChunkRange, file_identifier, relative_path, total_chunks};
pub use progress::ThroughputMeter;
pub use types::UploadSession;
pub use validation::{validate_filename, validate_relative_path};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read for chunk {chunk}: expected {expected} bytes, got {actual}")]
    ShortRead {
        chunk: u32,
        expected: u64,
        actual: u64,
    },

    #[error("chunk {0} is out of range")]
    ChunkOutOfRange(u32),

    #[error("file too large: {0} chunks exceed the chunk counter")]
    TooManyChunks(u64),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid file name: {0}")]
    InvalidFilename(String),

    #[error("blocking read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
