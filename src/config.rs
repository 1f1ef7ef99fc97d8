use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tunables of a pipeline's in-process engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded capacity of every element-to-element channel.
    pub channel_capacity: usize,
    /// Worker threads of the pipeline's runtime.
    pub worker_threads: usize,
    /// Source queue length at or below which `need_data` fires.
    pub src_need_data_level: usize,
    /// Source queue length at or above which `enough_data` fires.
    pub src_max_queued: usize,
    /// Upper bound on waiting for element tasks during destroy.
    pub shutdown_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            worker_threads: 2,
            src_need_data_level: 0,
            src_max_queued: 64,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl PipelineConfig {
    /// Read the optional `pipeline_config` object of a JSON document.
    /// Missing keys keep their defaults; zero sizes are raised to one.
    pub fn from_json(config: &Value) -> anyhow::Result<Self> {
        let mut parsed = match config.get("pipeline_config") {
            Some(section) => serde_json::from_value::<PipelineConfig>(section.clone())?,
            None => PipelineConfig::default(),
        };
        parsed.channel_capacity = parsed.channel_capacity.max(1);
        parsed.worker_threads = parsed.worker_threads.max(1);
        parsed.src_max_queued = parsed.src_max_queued.max(1);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = PipelineConfig::from_json(&json!({})).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_section() {
        let config = PipelineConfig::from_json(&json!({
            "pipeline_config": { "channel_capacity": 8, "worker_threads": 0 }
        }))
        .unwrap();
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.src_max_queued, 64);
    }

    #[test]
    fn test_rejects_wrong_types() {
        let result = PipelineConfig::from_json(&json!({
            "pipeline_config": { "channel_capacity": "large" }
        }));
        assert!(result.is_err());
    }
}
