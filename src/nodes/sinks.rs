use super::tensor_buffer::buffer_to_tensors;
use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode};
use crate::registry::{ElementKind, ElementMetadata, PadTemplate, PropertySpec};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub fn tensor_sink_metadata() -> ElementMetadata {
    ElementMetadata::new("tensor_sink", "Hand tensors to the application", ElementKind::Sink, || {
        Box::new(CallbackSink::new("emit-signal"))
    })
    .with_src_pads(PadTemplate::None)
    .add_property(PropertySpec::uint32("signal-rate", 0))
    .add_property(PropertySpec::bool("emit-signal", true))
    .add_property(PropertySpec::bool("sync", false))
}

pub fn appsink_metadata() -> ElementMetadata {
    ElementMetadata::new("appsink", "Hand buffers to the application", ElementKind::Sink, || {
        Box::new(CallbackSink::new("emit-signals"))
    })
    .with_src_pads(PadTemplate::None)
    .add_property(PropertySpec::bool("emit-signals", false))
    .add_property(PropertySpec::bool("sync", false))
}

pub fn fakesink_metadata() -> ElementMetadata {
    ElementMetadata::new("fakesink", "Discard everything", ElementKind::Generic, || Box::new(FakeSink))
        .with_src_pads(PadTemplate::None)
        .add_property(PropertySpec::bool("sync", false))
        .add_property(PropertySpec::bool("silent", true))
}

pub fn filesink_metadata() -> ElementMetadata {
    ElementMetadata::new("filesink", "Write buffers to a file", ElementKind::Generic, || {
        Box::new(FileSink { file: None })
    })
    .with_src_pads(PadTemplate::None)
    .add_property(PropertySpec::string("location", ""))
    .add_property(PropertySpec::bool("sync", false))
}

/// Delivers every buffer, as tensors, to the callbacks connected on its
/// element.
pub struct CallbackSink {
    emit_property: &'static str,
    caps: Caps,
    last_emit: Option<Instant>,
}

impl CallbackSink {
    pub fn new(emit_property: &'static str) -> Self {
        Self {
            emit_property,
            caps: Caps::Any,
            last_emit: None,
        }
    }

    /// `signal-rate` caps deliveries per second; zero delivers all.
    fn rate_allows(&mut self, ctx: &NodeContext) -> bool {
        let rate = match ctx.props().spec("signal-rate") {
            Ok(_) => ctx.props().uint32("signal-rate"),
            Err(_) => 0,
        };
        if rate == 0 {
            return true;
        }
        let now = Instant::now();
        let interval = Duration::from_secs_f64(1.0 / rate as f64);
        match self.last_emit {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[async_trait]
impl ProcessingNode for CallbackSink {
    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        self.caps = inputs.first().cloned().unwrap_or(Caps::Any);
        Ok(Caps::Any)
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        if !ctx.props().bool(self.emit_property) {
            return Ok(());
        }
        let callbacks = ctx.element().new_data_callbacks();
        if callbacks.is_empty() || !self.rate_allows(ctx) {
            return Ok(());
        }

        let (data, info) = buffer_to_tensors(&buffer, &self.caps)
            .with_context(|| format!("sink '{}' cannot read buffer", ctx.element().name()))?;
        for callback in callbacks {
            ctx.dispatch(|| callback(&data, &info));
        }
        Ok(())
    }
}

pub struct FakeSink;

#[async_trait]
impl ProcessingNode for FakeSink {
    async fn process(&mut self, _pad: usize, _buffer: Buffer, _ctx: &mut NodeContext) -> Result<()> {
        Ok(())
    }
}

pub struct FileSink {
    file: Option<File>,
}

#[async_trait]
impl ProcessingNode for FileSink {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        let location = element.props().string("location");
        if location.is_empty() {
            bail!("filesink '{}' has no location", element.name());
        }
        let file = File::create(&location).with_context(|| format!("cannot open '{}'", location))?;
        debug!(element = %element.name(), location = %location, "file opened");
        self.file = Some(file);
        Ok(())
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, _ctx: &mut NodeContext) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| anyhow!("file is not open"))?;
        for memory in &buffer.memories {
            file.write_all(memory)?;
        }
        file.flush()?;
        Ok(())
    }

    async fn finish(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        Ok(())
    }
}
