use std::collections::BTreeSet;
use std::sync::RwLock;
use std::time::Instant;

use psyhub_protocol::{UploadProgress, UploadStatus};

use crate::planner::ChunkPlan;

/// State of one file upload attempt (thread-safe).
///
/// The plan is fixed at creation; only the confirmed-chunk set and the
/// lifecycle status change. All transitions return `false` instead of
/// failing when they do not apply to the current status.
pub struct UploadSession {
    plan: ChunkPlan,
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    status: UploadStatus,
    uploaded: BTreeSet<u32>,
    url: Option<String>,
    error: String,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
}

impl UploadSession {
    /// Creates a session in `preparing`.
    pub fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            inner: RwLock::new(SessionInner {
                status: UploadStatus::Preparing,
                uploaded: BTreeSet::new(),
                url: None,
                error: String::new(),
                started_at: None,
                completed_at: None,
            }),
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn identifier(&self) -> &str {
        &self.plan.identifier
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.total_chunks
    }

    /// `preparing → uploading`.
    pub fn start(&self) -> bool {
        let mut s = self.inner.write().unwrap();
        if s.status != UploadStatus::Preparing {
            return false;
        }
        s.status = UploadStatus::Uploading;
        s.started_at = Some(Instant::now());
        true
    }

    /// `uploading → paused`.
    pub fn pause(&self) -> bool {
        self.transition(UploadStatus::Uploading, UploadStatus::Paused)
    }

    /// `paused → uploading`.
    pub fn resume(&self) -> bool {
        self.transition(UploadStatus::Paused, UploadStatus::Uploading)
    }

    fn transition(&self, from: UploadStatus, to: UploadStatus) -> bool {
        let mut s = self.inner.write().unwrap();
        if s.status != from {
            tracing::debug!(
                identifier = %self.plan.identifier,
                status = ?s.status,
                wanted = ?to,
                "ignoring status transition"
            );
            return false;
        }
        s.status = to;
        true
    }

    /// Records a chunk as persisted remotely.
    ///
    /// Returns `true` only when the chunk was not recorded before. Numbers
    /// outside `1..=total_chunks` and completed sessions are ignored.
    pub fn mark_uploaded(&self, chunk_number: u32) -> bool {
        if chunk_number == 0 || chunk_number > self.plan.total_chunks {
            return false;
        }
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Completed {
            return false;
        }
        s.uploaded.insert(chunk_number)
    }

    pub fn is_uploaded(&self, chunk_number: u32) -> bool {
        let s = self.inner.read().unwrap();
        s.uploaded.contains(&chunk_number)
    }

    pub fn uploaded_count(&self) -> u32 {
        let s = self.inner.read().unwrap();
        s.uploaded.len() as u32
    }

    /// Chunk numbers not yet confirmed, ascending.
    pub fn missing_chunks(&self) -> Vec<u32> {
        let s = self.inner.read().unwrap();
        self.plan
            .chunk_numbers()
            .filter(|n| !s.uploaded.contains(n))
            .collect()
    }

    pub fn all_uploaded(&self) -> bool {
        self.uploaded_count() == self.plan.total_chunks
    }

    /// Bytes covered by confirmed chunks.
    pub fn uploaded_bytes(&self) -> u64 {
        let s = self.inner.read().unwrap();
        self.plan.bytes_in(&s.uploaded)
    }

    /// `round(100 * uploaded / total)`.
    pub fn progress(&self) -> u8 {
        percent(self.uploaded_count(), self.plan.total_chunks)
    }

    /// `uploading → completed`; requires every chunk confirmed.
    ///
    /// A pause that arrives while the merge call is in flight does not stop
    /// the merge, so `paused` completes as well.
    pub fn complete(&self, url: &str) -> bool {
        let mut s = self.inner.write().unwrap();
        let open = matches!(s.status, UploadStatus::Uploading | UploadStatus::Paused);
        if !open || s.uploaded.len() as u32 != self.plan.total_chunks {
            return false;
        }
        let now = Instant::now();
        s.status = UploadStatus::Completed;
        s.url = Some(url.to_string());
        s.completed_at = Some(now);
        true
    }

    /// Moves a non-terminal session to `error`.
    pub fn fail(&self, err: &str) -> bool {
        let mut s = self.inner.write().unwrap();
        if s.status.is_terminal() {
            return false;
        }
        let now = Instant::now();
        s.status = UploadStatus::Error;
        s.error = err.to_string();
        s.completed_at = Some(now);
        true
    }

    /// Drops every confirmed chunk and returns to `preparing`.
    pub fn reset(&self) {
        let mut s = self.inner.write().unwrap();
        s.status = UploadStatus::Preparing;
        s.uploaded.clear();
        s.url = None;
        s.error.clear();
        s.started_at = None;
        s.completed_at = None;
    }

    pub fn status(&self) -> UploadStatus {
        let s = self.inner.read().unwrap();
        s.status
    }

    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Final asset URL once completed.
    pub fn url(&self) -> Option<String> {
        let s = self.inner.read().unwrap();
        s.url.clone()
    }

    pub fn error(&self) -> String {
        let s = self.inner.read().unwrap();
        s.error.clone()
    }

    /// Time since `start`, if started.
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        let s = self.inner.read().unwrap();
        let started = s.started_at?;
        Some(s.completed_at.unwrap_or_else(Instant::now) - started)
    }

    /// Serializable view of the session.
    pub fn snapshot(&self) -> UploadProgress {
        let s = self.inner.read().unwrap();
        let uploaded = s.uploaded.len() as u32;
        UploadProgress {
            identifier: self.plan.identifier.clone(),
            filename: self.plan.filename.clone(),
            status: s.status,
            progress: percent(uploaded, self.plan.total_chunks),
            uploaded_chunks: uploaded,
            total_chunks: self.plan.total_chunks,
            error: s.error.clone(),
        }
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("identifier", &self.plan.identifier)
            .field("filename", &self.plan.filename)
            .field("status", &self.status())
            .field("uploaded", &self.uploaded_count())
            .field("total_chunks", &self.plan.total_chunks)
            .finish()
    }
}

fn percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * f64::from(done) / f64::from(total)).round() as u8
}
