//! In-memory storage backend for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use psyhub_protocol::{ChunkQuery, ChunkUploadMeta, MergeRequest};

use crate::backend::{BackendFuture, StorageBackend};
use crate::error::UploadError;

/// Holds an upload call open until released.
#[derive(Default)]
pub(crate) struct Gate {
    pub started: Notify,
    pub release: Notify,
}

/// Records every call and answers from configurable state.
#[derive(Default)]
pub(crate) struct MockBackend {
    existing: Mutex<HashSet<u32>>,
    exists_calls: Mutex<Vec<u32>>,
    upload_calls: Mutex<Vec<(ChunkUploadMeta, usize)>>,
    merge_calls: Mutex<Vec<MergeRequest>>,
    /// Remaining forced failures per chunk.
    fail_uploads: Mutex<HashMap<u32, u32>>,
    fail_exists: Mutex<HashMap<u32, u32>>,
    fail_merge: AtomicBool,
    gates: Mutex<HashMap<u32, Arc<Gate>>>,
    upload_delay: Mutex<Option<Duration>>,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_existing(chunks: &[u32]) -> Arc<Self> {
        let mock = Self::default();
        mock.existing.lock().unwrap().extend(chunks);
        Arc::new(mock)
    }

    /// Fails the next `times` uploads of `chunk`.
    pub fn fail_upload(&self, chunk: u32, times: u32) {
        self.fail_uploads.lock().unwrap().insert(chunk, times);
    }

    /// Fails the next `times` existence checks of `chunk`.
    pub fn fail_exists(&self, chunk: u32, times: u32) {
        self.fail_exists.lock().unwrap().insert(chunk, times);
    }

    pub fn fail_merge(&self) {
        self.fail_merge.store(true, Ordering::SeqCst);
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    /// Blocks uploads of `chunk` until the returned gate is released.
    pub fn gate(&self, chunk: u32) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(chunk, Arc::clone(&gate));
        gate
    }

    pub fn exists_calls(&self) -> Vec<u32> {
        self.exists_calls.lock().unwrap().clone()
    }

    /// Chunk numbers passed to `upload_chunk`, in call order.
    pub fn uploaded(&self) -> Vec<u32> {
        self.upload_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.chunk_number)
            .collect()
    }

    pub fn upload_metas(&self) -> Vec<(ChunkUploadMeta, usize)> {
        self.upload_calls.lock().unwrap().clone()
    }

    pub fn merge_calls(&self) -> Vec<MergeRequest> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }
}

impl StorageBackend for MockBackend {
    fn chunk_exists(&self, query: ChunkQuery) -> BackendFuture<'_, bool> {
        Box::pin(async move {
            let chunk = query.chunk_number;
            self.exists_calls.lock().unwrap().push(chunk);

            let mut failures = self.fail_exists.lock().unwrap();
            if let Some(left) = failures.get_mut(&chunk)
                && *left > 0
            {
                *left -= 1;
                return Err(UploadError::Backend(format!("check of chunk {chunk} failed")));
            }
            drop(failures);

            let exists = self
                .existing
                .lock()
                .unwrap()
                .contains(&chunk);
            Ok(exists)
        })
    }

    fn upload_chunk(&self, meta: ChunkUploadMeta, data: Vec<u8>) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let chunk = meta.chunk_number;
            self.upload_calls.lock().unwrap().push((meta, data.len()));

            let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_inflight.fetch_max(now, Ordering::SeqCst);

            let gate = self.gates.lock().unwrap().get(&chunk).cloned();
            let delay = *self.upload_delay.lock().unwrap();
            if let Some(gate) = gate {
                gate.started.notify_one();
                gate.release.notified().await;
            } else if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }
            self.inflight.fetch_sub(1, Ordering::SeqCst);

            let mut failures = self.fail_uploads.lock().unwrap();
            if let Some(left) = failures.get_mut(&chunk)
                && *left > 0
            {
                *left -= 1;
                return Err(UploadError::Backend(format!("chunk {chunk} rejected")));
            }
            drop(failures);

            self.existing.lock().unwrap().insert(chunk);
            Ok(())
        })
    }

    fn merge_chunks(&self, request: MergeRequest) -> BackendFuture<'_, String> {
        Box::pin(async move {
            let url = format!(
                "https://cdn.example.com/{}/{}",
                request.relative_path, request.filename
            );
            self.merge_calls.lock().unwrap().push(request);
            tokio::task::yield_now().await;
            if self.fail_merge.load(Ordering::SeqCst) {
                return Err(UploadError::Backend("merge rejected".into()));
            }
            Ok(url)
        })
    }
}
