//! Bounded chunk scheduler for one session.
//!
//! Workers are futures polled inside the scheduler's own task through a
//! `FuturesUnordered`, so at most `concurrency` chunks are in flight and
//! every state change happens between two polls. The loop reacts to three
//! things: a worker finishing, the pause flag flipping, and cancellation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use psyhub_transfer::{SourceFile, ThroughputMeter, UploadSession};

use crate::backend::StorageBackend;
use crate::control::UploadControl;
use crate::error::UploadError;
use crate::merge::{MergeFinalizer, MergeLatch};
use crate::options::UploadOptions;
use crate::types::{ChunkOutcome, ChunkReport, UploadEvent};
use crate::worker::ChunkWorker;

/// Drives one session from `preparing` to a merged URL.
pub struct Scheduler {
    worker: Arc<ChunkWorker>,
    finalizer: MergeFinalizer,
    session: Arc<UploadSession>,
    control: UploadControl,
    options: UploadOptions,
    meter: ThroughputMeter,
    events: mpsc::UnboundedSender<UploadEvent>,
}

/// Mutable bookkeeping of a run.
#[derive(Default)]
struct Queue {
    /// Chunks waiting for a worker, with the delay to apply first.
    pending: VecDeque<(u32, Duration)>,
    running: HashSet<u32>,
    failures: HashMap<u32, u32>,
}

impl Queue {
    /// Rebuilds `pending` from the session: everything missing and not running.
    fn refill(&mut self, session: &UploadSession) {
        self.pending = session
            .missing_chunks()
            .into_iter()
            .filter(|n| !self.running.contains(n))
            .map(|n| (n, Duration::ZERO))
            .collect();
    }
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        session: Arc<UploadSession>,
        source: SourceFile,
        control: UploadControl,
        latch: Arc<MergeLatch>,
        options: UploadOptions,
        events: mpsc::UnboundedSender<UploadEvent>,
    ) -> Self {
        let worker = ChunkWorker::new(
            Arc::clone(&backend),
            Arc::clone(&session),
            source,
            control.clone(),
        );
        let finalizer = MergeFinalizer::new(backend, Arc::clone(&session), latch);
        Self {
            worker: Arc::new(worker),
            finalizer,
            session,
            control,
            options,
            meter: ThroughputMeter::default(),
            events,
        }
    }

    /// Uploads every missing chunk, then merges.
    ///
    /// Returns the asset URL. On cancellation all in-flight workers are
    /// dropped and [`UploadError::Cancelled`] is returned.
    pub async fn run(self) -> Result<String, UploadError> {
        let identifier = self.session.identifier().to_string();
        if !self.session.start() {
            return Err(UploadError::NotActive {
                identifier,
                status: self.session.status(),
            });
        }

        let concurrency = self.options.concurrency();
        let mut paused_rx = self.control.subscribe_paused();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, ChunkReport>> =
            FuturesUnordered::new();
        let mut queue = Queue::default();
        queue.refill(&self.session);
        let mut was_paused = self.control.is_paused();

        self.meter.start();
        info!(
            identifier = %identifier,
            chunks = self.session.total_chunks(),
            missing = queue.pending.len(),
            concurrency,
            "upload started"
        );

        loop {
            if self.control.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let paused = *paused_rx.borrow_and_update();
            if was_paused && !paused {
                queue.refill(&self.session);
                debug!(identifier = %identifier, pending = queue.pending.len(), "resumed");
            }
            was_paused = paused;

            if !paused {
                while queue.running.len() < concurrency {
                    let Some((chunk, delay)) = queue.pending.pop_front() else {
                        break;
                    };
                    if self.session.is_uploaded(chunk) || !queue.running.insert(chunk) {
                        continue;
                    }
                    let worker = Arc::clone(&self.worker);
                    in_flight.push(async move { worker.run(chunk, delay).await }.boxed());
                }
            }

            if in_flight.is_empty() && !paused {
                if self.session.all_uploaded() {
                    return tokio::select! {
                        result = self.finalizer.finalize() => result,
                        _ = self.control.cancelled() => Err(UploadError::Cancelled),
                    };
                }
                if queue.pending.is_empty() {
                    queue.refill(&self.session);
                    continue;
                }
            }

            tokio::select! {
                Some(report) = in_flight.next(), if !in_flight.is_empty() => {
                    self.handle_report(report, &mut queue)?;
                }
                changed = paused_rx.changed() => {
                    if changed.is_err() {
                        return Err(UploadError::Cancelled);
                    }
                }
                _ = self.control.cancelled() => {
                    return Err(UploadError::Cancelled);
                }
            }
        }
    }

    fn handle_report(&self, report: ChunkReport, queue: &mut Queue) -> Result<(), UploadError> {
        let chunk = report.chunk;
        queue.running.remove(&chunk);

        match report.outcome {
            ChunkOutcome::Uploaded | ChunkOutcome::Skipped | ChunkOutcome::AlreadyDone => {
                queue.failures.remove(&chunk);
                if report.newly_recorded {
                    // Only bytes that went over the wire count as throughput.
                    if matches!(report.outcome, ChunkOutcome::Uploaded) {
                        self.meter.record(report.bytes);
                    }
                    self.emit_progress();
                }
            }
            ChunkOutcome::Deferred => queue.pending.push_back((chunk, Duration::ZERO)),
            ChunkOutcome::Discarded => {}
            ChunkOutcome::Failed(err) => {
                let failures = queue.failures.entry(chunk).or_insert(0);
                *failures += 1;
                let retry = &self.options.retry;
                if !retry.allows_retry(*failures) {
                    error!(
                        identifier = %self.session.identifier(),
                        chunk,
                        attempts = *failures,
                        error = %err,
                        "giving up on chunk"
                    );
                    return Err(UploadError::RetriesExhausted {
                        chunk,
                        attempts: *failures,
                        last_error: err.to_string(),
                    });
                }
                let delay = retry.delay_for_attempt(*failures);
                warn!(
                    identifier = %self.session.identifier(),
                    chunk,
                    attempt = *failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "re-queueing chunk"
                );
                queue.pending.push_back((chunk, delay));
            }
        }
        Ok(())
    }

    fn emit_progress(&self) {
        let snapshot = self.session.snapshot();
        let _ = self.events.send(UploadEvent::Progress {
            identifier: snapshot.identifier,
            progress: snapshot.progress,
            uploaded_chunks: snapshot.uploaded_chunks,
            total_chunks: snapshot.total_chunks,
            bytes_per_second: self.meter.bytes_per_second(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::options::RetryPolicy;
    use chrono::NaiveDate;
    use psyhub_protocol::UploadStatus;
    use psyhub_transfer::ChunkPlan;

    struct Harness {
        mock: Arc<MockBackend>,
        session: Arc<UploadSession>,
        control: UploadControl,
        events: mpsc::UnboundedReceiver<UploadEvent>,
        scheduler: Scheduler,
    }

    fn harness(size: usize, mock: Arc<MockBackend>, options: UploadOptions) -> Harness {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let plan =
            ChunkPlan::new("deck.pdf", size as u64, "application/pdf", 5, date).unwrap();
        let session = Arc::new(UploadSession::new(plan));
        let control = UploadControl::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            Arc::clone(&mock) as Arc<dyn StorageBackend>,
            Arc::clone(&session),
            SourceFile::from_bytes("deck.pdf", vec![1u8; size]),
            control.clone(),
            Arc::new(MergeLatch::new()),
            options,
            tx,
        );
        Harness {
            mock,
            session,
            control,
            events: rx,
            scheduler,
        }
    }

    fn options(concurrency: usize, retry: RetryPolicy) -> UploadOptions {
        UploadOptions {
            chunk_size: 5,
            concurrency,
            retry,
        }
    }

    fn progress_values(rx: &mut mpsc::UnboundedReceiver<UploadEvent>) -> Vec<u8> {
        let mut out = vec![];
        while let Ok(ev) = rx.try_recv() {
            if let UploadEvent::Progress { progress, .. } = ev {
                out.push(progress);
            }
        }
        out
    }

    #[tokio::test]
    async fn uploads_every_chunk_then_merges() {
        let mut h = harness(12, MockBackend::new(), options(3, RetryPolicy::default()));
        let url = h.scheduler.run().await.unwrap();

        assert_eq!(url, "https://cdn.example.com/other/2026/10/deck.pdf");
        let mut uploaded = h.mock.uploaded();
        uploaded.sort();
        assert_eq!(uploaded, vec![1, 2, 3]);
        assert_eq!(h.mock.merge_calls().len(), 1);
        assert_eq!(h.session.status(), UploadStatus::Completed);
        assert_eq!(progress_values(&mut h.events), vec![33, 67, 100]);
    }

    #[tokio::test]
    async fn existing_chunks_are_skipped() {
        let h = harness(12, MockBackend::with_existing(&[1, 3]), options(3, RetryPolicy::default()));
        h.scheduler.run().await.unwrap();

        assert_eq!(h.mock.uploaded(), vec![2]);
        let mut checked = h.mock.exists_calls();
        checked.sort();
        assert_eq!(checked, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn skipped_chunks_do_not_count_as_throughput() {
        let mut h = harness(
            12,
            MockBackend::with_existing(&[1, 2, 3]),
            options(3, RetryPolicy::default()),
        );
        h.scheduler.run().await.unwrap();
        assert!(h.mock.uploaded().is_empty());

        let mut rates = vec![];
        while let Ok(ev) = h.events.try_recv() {
            if let UploadEvent::Progress {
                bytes_per_second, ..
            } = ev
            {
                rates.push(bytes_per_second);
            }
        }
        assert_eq!(rates, vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn failed_existence_check_is_retried() {
        let mock = MockBackend::new();
        mock.fail_exists(2, 1);
        let h = harness(12, mock, options(3, RetryPolicy::immediate(None)));
        h.scheduler.run().await.unwrap();

        let checks = h.mock.exists_calls().iter().filter(|&&n| n == 2).count();
        assert_eq!(checks, 2);
        let mut uploaded = h.mock.uploaded();
        uploaded.sort();
        assert_eq!(uploaded, vec![1, 2, 3]);
        assert_eq!(h.mock.merge_calls().len(), 1);
        assert_eq!(h.session.status(), UploadStatus::Completed);
    }

    #[tokio::test]
    async fn locally_recorded_chunks_are_not_rechecked() {
        let h = harness(12, MockBackend::new(), options(3, RetryPolicy::default()));
        h.session.mark_uploaded(1);
        h.scheduler.run().await.unwrap();

        let mut checked = h.mock.exists_calls();
        checked.sort();
        assert_eq!(checked, vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_concurrency() {
        let mock = MockBackend::new();
        mock.set_upload_delay(Duration::from_millis(50));
        let h = harness(50, mock, options(3, RetryPolicy::default()));
        h.scheduler.run().await.unwrap();

        assert_eq!(h.mock.uploaded().len(), 10);
        assert_eq!(h.mock.max_inflight(), 3);
    }

    #[tokio::test]
    async fn single_worker_uploads_in_order() {
        let h = harness(12, MockBackend::new(), options(1, RetryPolicy::default()));
        h.scheduler.run().await.unwrap();
        assert_eq!(h.mock.uploaded(), vec![1, 2, 3]);
        assert_eq!(h.mock.max_inflight(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let mock = MockBackend::new();
        mock.fail_upload(2, 4);
        let h = harness(12, mock, options(3, RetryPolicy::immediate(None)));
        h.scheduler.run().await.unwrap();

        let attempts = h.mock.uploaded().iter().filter(|&&n| n == 2).count();
        assert_eq!(attempts, 5);
        assert_eq!(h.mock.merge_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off() {
        let mock = MockBackend::new();
        mock.fail_upload(1, 2);
        let h = harness(5, mock, options(1, RetryPolicy::default()));

        let started = tokio::time::Instant::now();
        h.scheduler.run().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn retry_ceiling_ends_the_run() {
        let mock = MockBackend::new();
        mock.fail_upload(3, u32::MAX);
        let h = harness(12, mock, options(3, RetryPolicy::immediate(Some(3))));

        let err = h.scheduler.run().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::RetriesExhausted {
                chunk: 3,
                attempts: 3,
                ..
            }
        ));
        assert!(h.mock.merge_calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let h = harness(12, MockBackend::new(), options(3, RetryPolicy::default()));
        h.control.cancel();

        let err = h.scheduler.run().await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert!(h.mock.exists_calls().is_empty());
    }

    #[tokio::test]
    async fn run_requires_preparing_session() {
        let h = harness(12, MockBackend::new(), options(3, RetryPolicy::default()));
        h.session.start();

        let err = h.scheduler.run().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::NotActive {
                status: UploadStatus::Uploading,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pause_holds_new_workers_until_resume() {
        let mock = MockBackend::new();
        let gate = mock.gate(2);
        let h = harness(12, mock, options(1, RetryPolicy::default()));
        let control = h.control.clone();
        let session = Arc::clone(&h.session);
        let mock = Arc::clone(&h.mock);

        let driver = async {
            gate.started.notified().await;
            control.pause();
            gate.release.notify_one();
            while session.uploaded_count() < 2 {
                tokio::task::yield_now().await;
            }
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
            assert_eq!(mock.uploaded(), vec![1, 2]);
            control.resume();
        };

        let (result, ()) = tokio::join!(h.scheduler.run(), driver);
        result.unwrap();
        assert_eq!(h.mock.uploaded(), vec![1, 2, 3]);
        assert_eq!(h.mock.merge_calls().len(), 1);
    }
}
