use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Estimate-mode ceiling: the fraction stays below this until `finish`.
const ESTIMATE_CAP: f64 = 0.99;

/// Shared ingestion progress counters.
///
/// Exact mode fixes the total up front (flat drops) and `fraction` is a true
/// fraction of files accounted for. Estimate mode lets the total grow as
/// directories are discovered; `fraction` is then capped below 1.0 until
/// `finish` confirms the walk is complete, after which it snaps to 1.0.
#[derive(Clone)]
pub struct IngestProgress {
    exact: bool,
    files_done: Arc<AtomicUsize>,
    files_total: Arc<AtomicUsize>,
    bytes_done: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
    reporting: Arc<AtomicBool>,
    high_water: Arc<AtomicU64>,
}

impl IngestProgress {
    /// Total known in advance (flat-file mode).
    pub fn exact(total: usize) -> Self {
        Self::new(true, total)
    }

    /// Total unknown up front (directory mode).
    pub fn estimate() -> Self {
        Self::new(false, 0)
    }

    fn new(exact: bool, total: usize) -> Self {
        IngestProgress {
            exact,
            files_done: Arc::new(AtomicUsize::new(0)),
            files_total: Arc::new(AtomicUsize::new(total)),
            bytes_done: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            reporting: Arc::new(AtomicBool::new(false)),
            high_water: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add_discovered(&self, n: usize) {
        self.files_total.fetch_add(n, Ordering::Relaxed);
    }

    /// One file accounted for, whether its read succeeded or failed.
    pub fn file_done(&self, bytes: usize) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn files_done(&self) -> usize {
        self.files_done.load(Ordering::Relaxed)
    }

    pub fn files_total(&self) -> usize {
        self.files_total.load(Ordering::Relaxed)
    }

    pub fn bytes_done(&self) -> usize {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Monotonic non-decreasing. In estimate mode this stays below 1.0
    /// until `finish`; exact mode reports the true fraction throughout.
    pub fn fraction(&self) -> f64 {
        if self.finished.load(Ordering::Relaxed) {
            return 1.0;
        }
        let total = self.files_total.load(Ordering::Relaxed);
        let done = self.files_done.load(Ordering::Relaxed);
        let raw = if total == 0 { 0.0 } else { done as f64 / total as f64 };
        let capped = if self.exact { raw.min(1.0) } else { raw.min(ESTIMATE_CAP) };
        // High-water mark keeps the reported fraction monotonic while the
        // discovered total is still growing under the walk.
        let bits = capped.to_bits();
        let prev = self.high_water.fetch_max(bits, Ordering::Relaxed);
        f64::from_bits(prev.max(bits))
    }

    /// Spawn a background reporter that prints counters to stderr until
    /// `stop_reporter` is called. Repeated calls are no-ops.
    pub fn start_reporter(&self, interval: Duration) {
        if self.reporting.swap(true, Ordering::Relaxed) {
            return;
        }
        let me = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while me.reporting.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if !me.reporting.load(Ordering::Relaxed) {
                    break;
                }
                eprintln!(
                    "[{:>4}s] ingest {}/{} files | {} KiB | {}%",
                    t0.elapsed().as_secs(),
                    me.files_done(),
                    me.files_total(),
                    me.bytes_done() / 1024,
                    (me.fraction() * 100.0) as u32
                );
            }
        });
    }

    pub fn stop_reporter(&self) {
        self.reporting.store(false, Ordering::Relaxed);
    }
}
