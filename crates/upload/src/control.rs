//! Pause and cancel signals shared between the manager and a running scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Handle for steering one upload session from any task.
///
/// Cancellation is one-way; the pause flag can flip any number of times.
#[derive(Debug, Clone)]
pub struct UploadControl {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for UploadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    /// Stops launching new workers. Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        !self.paused.send_replace(true)
    }

    /// Allows workers to launch again. Returns `false` if not paused.
    pub fn resume(&self) -> bool {
        self.paused.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver that observes every pause/resume flip.
    pub fn subscribe_paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
