//! Wire types shared between the upload manager and the storage backend.
//!
//! The backend exposes three chunk endpoints (exists, upload, merge) and
//! wraps every response in a `{code, msg, data}` envelope.

pub mod envelope;
pub mod messages;
pub mod types;

pub use envelope::{ApiError, ApiResponse};
pub use messages::{ChunkQuery, ChunkUploadMeta, MergeData, MergeRequest};
pub use types::{MediaCategory, UploadProgress, UploadStatus};
