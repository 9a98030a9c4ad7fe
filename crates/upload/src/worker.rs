//! Per-chunk transfer: local check, remote existence check, upload.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use psyhub_protocol::{ChunkQuery, ChunkUploadMeta};
use psyhub_transfer::{ChunkRange, SourceFile, UploadSession};

use crate::backend::StorageBackend;
use crate::control::UploadControl;
use crate::error::UploadError;
use crate::types::{ChunkOutcome, ChunkReport};

/// Moves single chunks of one session to the backend.
///
/// Never returns an error: every failure is folded into
/// [`ChunkOutcome::Failed`] so the scheduler decides what to do with it.
pub struct ChunkWorker {
    backend: Arc<dyn StorageBackend>,
    session: Arc<UploadSession>,
    source: SourceFile,
    control: UploadControl,
}

impl ChunkWorker {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        session: Arc<UploadSession>,
        source: SourceFile,
        control: UploadControl,
    ) -> Self {
        Self {
            backend,
            session,
            source,
            control,
        }
    }

    /// Transfers chunk `chunk`, waiting `delay` first when it is a retry.
    pub async fn run(&self, chunk: u32, delay: Duration) -> ChunkReport {
        let range = match self.session.plan().range(chunk) {
            Ok(range) => range,
            Err(e) => {
                return ChunkReport {
                    chunk,
                    bytes: 0,
                    newly_recorded: false,
                    outcome: ChunkOutcome::Failed(e.into()),
                };
            }
        };
        let bytes = range.len();

        let (newly_recorded, outcome) = match self.attempt(range, delay).await {
            Ok(done) => done,
            Err(e) => {
                warn!(
                    identifier = %self.session.identifier(),
                    chunk,
                    error = %e,
                    "chunk transfer failed"
                );
                (false, ChunkOutcome::Failed(e))
            }
        };

        ChunkReport {
            chunk,
            bytes,
            newly_recorded,
            outcome,
        }
    }

    async fn attempt(
        &self,
        range: ChunkRange,
        delay: Duration,
    ) -> Result<(bool, ChunkOutcome), UploadError> {
        let chunk = range.number;
        if self.session.is_uploaded(chunk) {
            return Ok((false, ChunkOutcome::AlreadyDone));
        }

        if !delay.is_zero() {
            debug!(
                chunk,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "waiting before retry"
            );
            tokio::select! {
                _ = self.control.cancelled() => return Ok((false, ChunkOutcome::Discarded)),
                _ = tokio::time::sleep(delay) => {}
            }
            if self.control.is_paused() {
                return Ok((false, ChunkOutcome::Deferred));
            }
        }
        if self.control.is_cancelled() {
            return Ok((false, ChunkOutcome::Discarded));
        }

        let plan = self.session.plan();
        let exists = self
            .backend
            .chunk_exists(ChunkQuery {
                identifier: plan.identifier.clone(),
                chunk_number: chunk,
            })
            .await?;
        if self.control.is_cancelled() {
            return Ok((false, ChunkOutcome::Discarded));
        }
        if exists {
            debug!(identifier = %plan.identifier, chunk, "chunk already on backend");
            let newly = self.session.mark_uploaded(chunk);
            return Ok((newly, ChunkOutcome::Skipped));
        }

        let data = self.source.read_chunk(range).await?;
        let meta = ChunkUploadMeta {
            identifier: plan.identifier.clone(),
            chunk_number: chunk,
            chunk_size: plan.chunk_size,
            current_chunk_size: range.len(),
            total_size: plan.total_size,
            filename: plan.filename.clone(),
            total_chunks: plan.total_chunks,
            media_type: plan.media_type.clone(),
            relative_path: plan.relative_path.clone(),
        };
        if self.control.is_cancelled() {
            return Ok((false, ChunkOutcome::Discarded));
        }
        self.backend.upload_chunk(meta, data).await?;

        if self.control.is_cancelled() {
            return Ok((false, ChunkOutcome::Discarded));
        }
        let newly = self.session.mark_uploaded(chunk);
        debug!(identifier = %plan.identifier, chunk, bytes = range.len(), "chunk uploaded");
        Ok((newly, ChunkOutcome::Uploaded))
    }
}
