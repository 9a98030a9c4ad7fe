//! Storage backend trait.
//!
//! `StorageBackend` is implemented by `psyhub-storage-client` on top of
//! the backend's HTTP chunk endpoints. Keeping it a trait leaves the
//! scheduler independent of the transport and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use psyhub_protocol::{ChunkQuery, ChunkUploadMeta, MergeRequest};

use crate::error::UploadError;

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// The three remote operations the upload manager depends on.
pub trait StorageBackend: Send + Sync {
    /// Returns whether the chunk is already stored. Idempotent.
    fn chunk_exists(&self, query: ChunkQuery) -> BackendFuture<'_, bool>;

    /// Stores one chunk. Safe to retry.
    fn upload_chunk(&self, meta: ChunkUploadMeta, data: Vec<u8>) -> BackendFuture<'_, ()>;

    /// Assembles all chunks of `request.identifier` and returns the asset URL.
    ///
    /// Not idempotent from the caller's point of view; the manager calls it
    /// at most once per session.
    fn merge_chunks(&self, request: MergeRequest) -> BackendFuture<'_, String>;
}
