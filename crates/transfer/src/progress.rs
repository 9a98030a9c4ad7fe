use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 64;

/// Sliding-window throughput estimate over confirmed chunk bytes.
///
/// Chunks land in bursts of several MiB, so the rate is measured from the
/// oldest retained sample to now rather than between samples.
pub struct ThroughputMeter {
    inner: Mutex<MeterInner>,
}

struct MeterInner {
    started: Option<Instant>,
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    max_samples: usize,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                started: None,
                samples: VecDeque::new(),
                window,
                max_samples: DEFAULT_MAX_SAMPLES,
            }),
        }
    }

    /// Marks the start of measurement (first byte in flight).
    pub fn start(&self) {
        let mut m = self.inner.lock().unwrap();
        m.started = Some(Instant::now());
        m.samples.clear();
    }

    /// Records `bytes` confirmed now.
    pub fn record(&self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    fn record_at(&self, bytes: u64, at: Instant) {
        let mut m = self.inner.lock().unwrap();
        if m.started.is_none() {
            m.started = Some(at);
        }
        m.samples.push_back((at, bytes));

        let window = m.window;
        while let Some(&(t, _)) = m.samples.front() {
            if at.duration_since(t) > window {
                m.samples.pop_front();
            } else {
                break;
            }
        }
        while m.samples.len() > m.max_samples {
            m.samples.pop_front();
        }
    }

    /// Bytes per second over the window, 0.0 when nothing is measurable.
    pub fn bytes_per_second(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let m = self.inner.lock().unwrap();
        let Some(&(oldest, _)) = m.samples.front() else {
            return 0.0;
        };
        // A window of one sample is measured from the start of the session.
        let from = if m.samples.len() == 1 {
            m.started.unwrap_or(oldest)
        } else {
            oldest
        };
        let elapsed = now.duration_since(from);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = m.samples.iter().map(|(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}
