use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-element counters, updated lock-free from the element's task.
pub struct NodeMetrics {
    element: String,
    buffers_processed: AtomicU64,
    buffers_dropped: AtomicU64,
    errors_count: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl NodeMetrics {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            buffers_processed: AtomicU64::new(0),
            buffers_dropped: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn buffers_processed(&self) -> u64 {
        self.buffers_processed.load(Ordering::Relaxed)
    }

    pub fn buffers_dropped(&self) -> u64 {
        self.buffers_dropped.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn record_buffer_processed(&self) {
        self.buffers_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_dropped(&self) {
        self.buffers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_counters() {
        let metrics = NodeMetrics::new("valve0");
        metrics.record_buffer_processed();
        metrics.record_buffer_processed();
        metrics.record_buffer_dropped();
        metrics.record_error();
        assert_eq!(metrics.element(), "valve0");
        assert_eq!(metrics.buffers_processed(), 2);
        assert_eq!(metrics.buffers_dropped(), 1);
        assert_eq!(metrics.errors_count(), 1);
    }

    #[test]
    fn test_latency_average() {
        let metrics = NodeMetrics::new("queue0");
        assert_eq!(metrics.avg_latency_us(), 0);
        let start = metrics.start_processing();
        std::thread::sleep(Duration::from_millis(2));
        metrics.finish_processing(start);
        assert!(metrics.avg_latency_us() >= 2_000);
    }
}
