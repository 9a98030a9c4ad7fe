//! Single-flight merge of a fully uploaded session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info};

use psyhub_protocol::MergeRequest;
use psyhub_transfer::UploadSession;

use crate::backend::StorageBackend;
use crate::error::UploadError;

/// One-shot claim on the merge of a session.
#[derive(Debug, Default)]
pub struct MergeLatch(AtomicBool);

impl MergeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the merge. Only the first caller gets `true`.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Asks the backend to assemble the session's chunks, at most once.
pub struct MergeFinalizer {
    backend: Arc<dyn StorageBackend>,
    session: Arc<UploadSession>,
    latch: Arc<MergeLatch>,
}

impl MergeFinalizer {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        session: Arc<UploadSession>,
        latch: Arc<MergeLatch>,
    ) -> Self {
        Self {
            backend,
            session,
            latch,
        }
    }

    /// Merges and moves the session to `completed` or `error`.
    ///
    /// Fails without a remote call when chunks are missing or the latch is
    /// already claimed. A failed merge is not retried.
    pub async fn finalize(&self) -> Result<String, UploadError> {
        let plan = self.session.plan();
        if !self.session.all_uploaded() {
            return Err(UploadError::Incomplete {
                uploaded: self.session.uploaded_count(),
                total: plan.total_chunks,
            });
        }
        if !self.latch.try_claim() {
            return Err(UploadError::MergeAlreadyClaimed);
        }

        info!(
            identifier = %plan.identifier,
            chunks = plan.total_chunks,
            "merging chunks"
        );
        let request = MergeRequest {
            identifier: plan.identifier.clone(),
            filename: plan.filename.clone(),
            total_chunks: plan.total_chunks,
            relative_path: plan.relative_path.clone(),
        };

        match self.backend.merge_chunks(request).await {
            Ok(url) => {
                if !self.session.complete(&url) {
                    return Err(UploadError::NotActive {
                        identifier: plan.identifier.clone(),
                        status: self.session.status(),
                    });
                }
                info!(identifier = %plan.identifier, url = %url, "upload completed");
                Ok(url)
            }
            Err(e) => {
                let msg = e.to_string();
                error!(identifier = %plan.identifier, error = %msg, "merge failed");
                self.session.fail(&msg);
                Err(UploadError::Merge(msg))
            }
        }
    }
}
