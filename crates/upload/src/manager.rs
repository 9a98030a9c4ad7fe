//! Upload manager owning the current session.
//!
//! Holds at most one [`UploadSession`] at a time. Selecting a file creates
//! it, [`upload`](UploadManager::upload) drives it through the scheduler,
//! and pause/resume/cancel can be called from other tasks while the upload
//! future is pending. Every state change is also published as an
//! [`UploadEvent`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use psyhub_protocol::{UploadProgress, UploadStatus};
use psyhub_transfer::{ChunkPlan, SourceFile, UploadSession};

use crate::backend::StorageBackend;
use crate::control::UploadControl;
use crate::error::UploadError;
use crate::merge::MergeLatch;
use crate::options::UploadOptions;
use crate::scheduler::Scheduler;
use crate::types::UploadEvent;

/// Everything tied to one selected file.
#[derive(Clone)]
struct ActiveUpload {
    session: Arc<UploadSession>,
    source: SourceFile,
    control: UploadControl,
    latch: Arc<MergeLatch>,
    /// Set while a scheduler is running for this session.
    running: Arc<AtomicBool>,
}

/// Releases the run claim when the upload future ends or is dropped.
struct RunClaim(Arc<AtomicBool>);

impl RunClaim {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Chunked upload manager for one file at a time.
pub struct UploadManager {
    backend: Arc<dyn StorageBackend>,
    options: UploadOptions,
    current: Mutex<Option<ActiveUpload>>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<UploadEvent>>>,
}

impl UploadManager {
    pub fn new(backend: Arc<dyn StorageBackend>, options: UploadOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            options,
            current: Mutex::new(None),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.lock().await.take()
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Plans `source` and makes it the current session.
    ///
    /// Fails with [`UploadError::AlreadyActive`] when the same file is
    /// already in a non-terminal session. Any other current session is
    /// cancelled and replaced.
    pub fn select_file(&self, source: SourceFile) -> Result<Arc<UploadSession>, UploadError> {
        let plan = ChunkPlan::today(
            source.name(),
            source.size(),
            source.media_type(),
            self.options.chunk_size,
        )?;

        let mut current = self.current.lock().unwrap();
        if let Some(active) = current.as_ref()
            && active.session.identifier() == plan.identifier
            && active.session.is_active()
        {
            debug!(identifier = %plan.identifier, "file already has an active session");
            return Err(UploadError::AlreadyActive(plan.identifier));
        }
        if let Some(previous) = current.take() {
            self.discard(previous);
        }

        let session = Arc::new(UploadSession::new(plan));
        let plan = session.plan();
        info!(
            identifier = %plan.identifier,
            filename = %plan.filename,
            size = plan.total_size,
            chunks = plan.total_chunks,
            path = %plan.relative_path,
            "file selected"
        );
        self.emit(UploadEvent::FileSelected {
            identifier: plan.identifier.clone(),
            filename: plan.filename.clone(),
            total_size: plan.total_size,
            total_chunks: plan.total_chunks,
        });

        *current = Some(ActiveUpload {
            session: Arc::clone(&session),
            source,
            control: UploadControl::new(),
            latch: Arc::new(MergeLatch::new()),
            running: Arc::new(AtomicBool::new(false)),
        });
        Ok(session)
    }

    /// Uploads the current session and returns the merged asset URL.
    ///
    /// Only one call per session may run; a second concurrent call fails
    /// with [`UploadError::AlreadyActive`]. A session that already ended
    /// must be re-selected first.
    pub async fn upload(&self) -> Result<String, UploadError> {
        let active = self.active().ok_or(UploadError::NoSession)?;
        let identifier = active.session.identifier().to_string();

        let Some(_claim) = RunClaim::acquire(&active.running) else {
            return Err(UploadError::AlreadyActive(identifier));
        };
        let status = active.session.status();
        if status != UploadStatus::Preparing {
            return Err(UploadError::NotActive { identifier, status });
        }

        let scheduler = Scheduler::new(
            Arc::clone(&self.backend),
            Arc::clone(&active.session),
            active.source.clone(),
            active.control.clone(),
            Arc::clone(&active.latch),
            self.options.clone(),
            self.events_tx.clone(),
        );

        // A cancel that lands while the last chunk fails leaves the run with
        // that failure; the session is already discarded by then.
        let result = match scheduler.run().await {
            Err(e) if active.control.is_cancelled() => {
                debug!(identifier = %identifier, error = %e, "ignoring failure after cancel");
                Err(UploadError::Cancelled)
            }
            other => other,
        };
        match &result {
            Ok(url) => self.emit(UploadEvent::Completed {
                identifier,
                url: url.clone(),
            }),
            Err(UploadError::Cancelled) => {
                debug!(identifier = %identifier, "upload run stopped by cancel");
            }
            Err(e) => {
                let error = e.to_string();
                warn!(identifier = %identifier, error = %error, "upload failed");
                active.session.fail(&error);
                self.emit(UploadEvent::Failed { identifier, error });
            }
        }
        result
    }

    /// Selects `source` and uploads it.
    pub async fn upload_file(&self, source: SourceFile) -> Result<String, UploadError> {
        self.select_file(source)?;
        self.upload().await
    }

    /// Stops launching new chunks. In-flight chunks still complete.
    ///
    /// No-op (`false`) unless the session is uploading, or once the merge
    /// has been claimed.
    pub fn pause(&self) -> bool {
        let Some(active) = self.active() else {
            return false;
        };
        if active.latch.is_claimed() || !active.session.pause() {
            return false;
        }
        active.control.pause();
        info!(identifier = %active.session.identifier(), "upload paused");
        self.emit(UploadEvent::Paused {
            identifier: active.session.identifier().to_string(),
        });
        true
    }

    /// Relaunches workers for every chunk still missing.
    ///
    /// No-op (`false`) unless the session is paused.
    pub fn resume(&self) -> bool {
        let Some(active) = self.active() else {
            return false;
        };
        if !active.session.resume() {
            return false;
        }
        active.control.resume();
        info!(identifier = %active.session.identifier(), "upload resumed");
        self.emit(UploadEvent::Resumed {
            identifier: active.session.identifier().to_string(),
        });
        true
    }

    /// Discards the current session. Returns `false` if there is none.
    pub fn cancel(&self) -> bool {
        let Some(active) = self.current.lock().unwrap().take() else {
            return false;
        };
        self.discard(active);
        true
    }

    /// Status of the current session, `None` if there is none.
    pub fn status(&self) -> Option<UploadStatus> {
        self.active().map(|a| a.session.status())
    }

    pub fn snapshot(&self) -> Option<UploadProgress> {
        self.active().map(|a| a.session.snapshot())
    }

    pub fn session(&self) -> Option<Arc<UploadSession>> {
        self.active().map(|a| a.session)
    }

    fn active(&self) -> Option<ActiveUpload> {
        self.current.lock().unwrap().clone()
    }

    fn discard(&self, active: ActiveUpload) {
        active.control.cancel();
        let identifier = active.session.identifier().to_string();
        let was_active = active.session.is_active();
        active.session.reset();
        if was_active {
            info!(identifier = %identifier, "upload cancelled");
            self.emit(UploadEvent::Cancelled { identifier });
        }
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        if let Ok(current) = self.current.get_mut()
            && let Some(active) = current.take()
        {
            active.control.cancel();
        }
    }
}
