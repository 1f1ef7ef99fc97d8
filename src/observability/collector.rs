use super::NodeMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub element: String,
    pub buffers_processed: u64,
    pub buffers_dropped: u64,
    pub errors_count: u64,
    pub avg_latency_us: u64,
}

/// Metrics of every element of one pipeline, keyed by element name.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<NodeMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<NodeMetrics>) {
        self.metrics.insert(metrics.element().to_string(), metrics);
    }

    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        self.metrics
            .values()
            .map(|m| MetricsSnapshot {
                element: m.element().to_string(),
                buffers_processed: m.buffers_processed(),
                buffers_dropped: m.buffers_dropped(),
                errors_count: m.errors_count(),
                avg_latency_us: m.avg_latency_us(),
            })
            .collect()
    }

    pub fn get(&self, element: &str) -> Option<Arc<NodeMetrics>> {
        self.metrics.get(element).cloned()
    }
}
