use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode};
use crate::registry::{ElementKind, ElementMetadata, PadTemplate, PropertySpec};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new("appsrc", "Source fed by the application", ElementKind::Source, || {
        Box::new(AppSrc::new())
    })
    .with_sink_pads(PadTemplate::None)
    .add_property(PropertySpec::string("caps", ""))
    .add_property(PropertySpec::bool("is-live", false))
    .add_property(PropertySpec::uint64("max-buffers", 0))
}

/// Pops buffers injected through a source handle, in injection order.
pub struct AppSrc {
    input: Option<mpsc::UnboundedReceiver<Buffer>>,
    caps: Caps,
    need_level: usize,
    max_queued: usize,
    starving: bool,
    full: bool,
}

impl AppSrc {
    pub fn new() -> Self {
        Self {
            input: None,
            caps: Caps::Any,
            need_level: 0,
            max_queued: 1,
            starving: false,
            full: false,
        }
    }

    /// Fire `need_data` / `enough_data` on queue level crossings.
    fn signal_level(&mut self, queued: usize, ctx: &NodeContext) {
        let callbacks = ctx.element().src_callbacks();

        if queued >= self.max_queued {
            if !self.full {
                self.full = true;
                if let Some(cb) = callbacks.as_ref().and_then(|c| c.enough_data.clone()) {
                    ctx.dispatch(|| cb());
                }
            }
        } else {
            self.full = false;
        }

        if queued <= self.need_level && !self.starving {
            self.starving = true;
            if let Some(cb) = callbacks.and_then(|c| c.need_data) {
                trace!(element = %ctx.element().name(), queued, "need data");
                ctx.dispatch(|| cb(queued));
            }
        }
    }
}

impl Default for AppSrc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for AppSrc {
    fn on_create(&mut self, element: &Arc<Element>, config: &PipelineConfig) -> Result<()> {
        let caps = element.props().string("caps");
        if !caps.is_empty() {
            self.caps = Caps::parse(&caps)?;
        }
        let max = element.props().uint64("max-buffers") as usize;
        self.max_queued = if max > 0 { max } else { config.src_max_queued };
        self.need_level = config.src_need_data_level;
        self.input = Some(element.open_input());
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, _inputs: &[Caps], hint: Option<&Caps>) -> Result<Caps> {
        if let (Caps::Any, Some(wanted)) = (&self.caps, hint) {
            self.caps = wanted.clone();
        }
        Ok(self.caps.clone())
    }

    fn is_source(&self) -> bool {
        true
    }

    async fn produce(&mut self, ctx: &mut NodeContext) -> Result<Option<Buffer>> {
        let queued = match &self.input {
            Some(rx) => rx.len(),
            None => return Ok(None),
        };
        self.signal_level(queued, ctx);

        let Some(rx) = self.input.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(buffer) => {
                self.starving = false;
                Ok(Some(buffer))
            }
            None => Ok(None),
        }
    }

    async fn flush(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        if let Some(rx) = self.input.as_mut() {
            while rx.try_recv().is_ok() {}
        }
        self.starving = false;
        self.full = false;
        Ok(())
    }
}
