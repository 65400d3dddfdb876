use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency summary for one endpoint.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.update_max(ms);
    }

    fn update_max(&self, value: u64) {
        let mut current = self.max_ms.load(Ordering::Relaxed);
        while value > current {
            match self.max_ms.compare_exchange_weak(
                current,
                value,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => current = next,
            }
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub get_state: LatencySnapshot,
    pub save_state: LatencySnapshot,
    pub register_referral: LatencySnapshot,
}

#[derive(Default)]
pub struct HttpMetrics {
    get_state: LatencyMetrics,
    save_state: LatencyMetrics,
    register_referral: LatencyMetrics,
}

impl HttpMetrics {
    pub fn record_get_state(&self, duration: Duration) {
        self.get_state.record(duration);
    }

    pub fn record_save_state(&self, duration: Duration) {
        self.save_state.record(duration);
    }

    pub fn record_register_referral(&self, duration: Duration) {
        self.register_referral.record(duration);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            get_state: self.get_state.snapshot(),
            save_state: self.save_state.snapshot(),
            register_referral: self.register_referral.snapshot(),
        }
    }
}
