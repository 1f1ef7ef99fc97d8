use super::ErrorPolicy;
use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode};
use crate::observability::NodeMetrics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Wraps an element, timing every buffer and applying the element's
/// [`ErrorPolicy`] to failures.
pub struct ResilientNode {
    inner: Box<dyn ProcessingNode>,
    metrics: Arc<NodeMetrics>,
    error_policy: ErrorPolicy,
}

impl ResilientNode {
    pub fn new(inner: Box<dyn ProcessingNode>, metrics: Arc<NodeMetrics>) -> Self {
        let error_policy = inner.error_policy();
        Self {
            inner,
            metrics,
            error_policy,
        }
    }
}

#[async_trait]
impl ProcessingNode for ResilientNode {
    fn on_create(&mut self, element: &Arc<Element>, config: &PipelineConfig) -> Result<()> {
        self.inner.on_create(element, config)
    }

    fn negotiate(&mut self, element: &Element, inputs: &[Caps], hint: Option<&Caps>) -> Result<Caps> {
        self.inner.negotiate(element, inputs, hint)
    }

    fn is_source(&self) -> bool {
        self.inner.is_source()
    }

    fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    async fn produce(&mut self, ctx: &mut NodeContext) -> Result<Option<Buffer>> {
        let produced = self.inner.produce(ctx).await;
        match &produced {
            Ok(Some(_)) => self.metrics.record_buffer_processed(),
            Ok(None) => {}
            Err(_) => self.metrics.record_error(),
        }
        produced
    }

    async fn process(&mut self, pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let start = self.metrics.start_processing();
        let result = self.inner.process(pad, buffer, ctx).await;

        match result {
            Ok(()) => {
                self.metrics.finish_processing(start);
                self.metrics.record_buffer_processed();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_error();
                match self.error_policy {
                    ErrorPolicy::Propagate => Err(e),
                    ErrorPolicy::DropBuffer => {
                        warn!(element = %self.metrics.element(), error = %e, "buffer dropped");
                        self.metrics.record_buffer_dropped();
                        Ok(())
                    }
                }
            }
        }
    }

    async fn flush(&mut self, ctx: &mut NodeContext) -> Result<()> {
        self.inner.flush(ctx).await
    }

    async fn finish(&mut self, ctx: &mut NodeContext) -> Result<()> {
        self.inner.finish(ctx).await
    }
}
