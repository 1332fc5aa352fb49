// Worker statistics: batch outcomes, download volume, cache hit rate, evictions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

struct StatsSample {
    at: Instant,
    download_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub works_downloaded: u64,
    pub download_bps: u64,
    pub cache_hit_rate: f64,
    pub works_evicted: u64,
}

pub struct WorkerStats {
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    works_downloaded: AtomicU64,
    download_bytes_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    works_evicted: AtomicU64,
    last_sample: Mutex<StatsSample>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            batches_completed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            works_downloaded: AtomicU64::new(0),
            download_bytes_total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            works_evicted: AtomicU64::new(0),
            last_sample: Mutex::new(StatsSample {
                at: Instant::now(),
                download_bytes: 0,
            }),
        }
    }

    pub fn record_download(&self, bytes: u64) {
        self.works_downloaded.fetch_add(1, Ordering::Relaxed);
        self.download_bytes_total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a membership lookup: `hits` works were cached, `misses` were not.
    pub fn record_lookup(&self, hits: u64, misses: u64) {
        self.cache_hits.fetch_add(hits, Ordering::Relaxed);
        self.cache_misses.fetch_add(misses, Ordering::Relaxed);
    }

    pub fn record_batch(&self, succeeded: bool) {
        if succeeded {
            self.batches_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_evicted(&self, works: u64) {
        self.works_evicted.fetch_add(works, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let current_download = self.download_bytes_total.load(Ordering::Relaxed);

        let download_bps = {
            let mut sample = self.last_sample.lock();
            let elapsed = now.duration_since(sample.at).as_secs_f64();
            let bps = if elapsed > 0.1 {
                ((current_download - sample.download_bytes) as f64 / elapsed) as u64
            } else {
                0
            };
            sample.at = now;
            sample.download_bytes = current_download;
            bps
        };

        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let cache_hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64
        } else {
            0.0
        };

        StatsSnapshot {
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            works_downloaded: self.works_downloaded.load(Ordering::Relaxed),
            download_bps,
            cache_hit_rate,
            works_evicted: self.works_evicted.load(Ordering::Relaxed),
        }
    }

    pub fn total_downloaded(&self) -> u64 {
        self.download_bytes_total.load(Ordering::Relaxed)
    }
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}
