//! Chunked upload manager.
//!
//! Transfers one file to the storage backend as fixed-size chunks:
//!
//! 1. **Plan** — split the file, derive the identifier and storage path
//! 2. **Transfer** — per chunk, check remote existence then upload
//! 3. **Schedule** — keep at most `concurrency` chunks in flight, re-queue failures
//! 4. **Control** — pause/resume/cancel from any task while the upload runs
//! 5. **Merge** — once every chunk is confirmed, merge exactly once
//!
//! The backend is abstracted behind [`StorageBackend`] so the manager can
//! be driven by the HTTP client in `psyhub-storage-client` or by a mock.

pub mod backend;
pub mod control;
pub mod error;
pub mod manager;
pub mod merge;
pub mod options;
pub mod scheduler;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{BackendFuture, StorageBackend};
pub use control::UploadControl;
pub use error::UploadError;
pub use manager::UploadManager;
pub use merge::{MergeFinalizer, MergeLatch};
pub use options::{RetryPolicy, UploadOptions};
pub use types::{ChunkOutcome, ChunkReport, UploadEvent};
