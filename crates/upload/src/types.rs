//! Event and report types exchanged between the manager, scheduler and workers.

use crate::error::UploadError;

/// Notifications emitted by [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A file was accepted and planned.
    FileSelected {
        identifier: String,
        filename: String,
        total_size: u64,
        total_chunks: u32,
    },
    /// A chunk was confirmed (uploaded or found remotely).
    Progress {
        identifier: String,
        progress: u8,
        uploaded_chunks: u32,
        total_chunks: u32,
        bytes_per_second: f64,
    },
    Paused {
        identifier: String,
    },
    Resumed {
        identifier: String,
    },
    /// The merge succeeded.
    Completed {
        identifier: String,
        url: String,
    },
    /// The session ended in `error`.
    Failed {
        identifier: String,
        error: String,
    },
    /// The session was discarded.
    Cancelled {
        identifier: String,
    },
}

impl UploadEvent {
    pub fn identifier(&self) -> &str {
        match self {
            Self::FileSelected { identifier, .. }
            | Self::Progress { identifier, .. }
            | Self::Paused { identifier }
            | Self::Resumed { identifier }
            | Self::Completed { identifier, .. }
            | Self::Failed { identifier, .. }
            | Self::Cancelled { identifier } => identifier,
        }
    }
}

/// How a single worker run ended.
#[derive(Debug)]
pub enum ChunkOutcome {
    /// Bytes were sent and the chunk is now recorded.
    Uploaded,
    /// The backend already had the chunk.
    Skipped,
    /// The chunk was recorded locally before the worker ran.
    AlreadyDone,
    /// Paused during the retry delay; nothing was sent.
    Deferred,
    /// Cancelled; any result was thrown away.
    Discarded,
    /// The existence check, read or upload failed.
    Failed(UploadError),
}

/// Result of one worker run, handed back to the scheduler.
#[derive(Debug)]
pub struct ChunkReport {
    pub chunk: u32,
    /// Byte length of the chunk.
    pub bytes: u64,
    /// Whether this run inserted the chunk into the uploaded set.
    pub newly_recorded: bool,
    pub outcome: ChunkOutcome,
}
