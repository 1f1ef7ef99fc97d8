//! Elements that route buffers without looking into them.

use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode, StreamItem};
use crate::registry::{ElementKind, ElementMetadata, PadTemplate, PropertySpec};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

pub fn valve_metadata() -> ElementMetadata {
    ElementMetadata::new("valve", "Drop buffers while closed", ElementKind::Valve, || Box::new(Valve))
        .add_property(PropertySpec::bool("drop", false))
}

pub fn tee_metadata() -> ElementMetadata {
    ElementMetadata::new("tee", "Copy buffers to every branch", ElementKind::Generic, || Box::new(Tee))
        .with_src_pads(PadTemplate::Request("src_"))
        .add_property(PropertySpec::bool("silent", true))
}

pub fn queue_metadata() -> ElementMetadata {
    ElementMetadata::new("queue", "Decouple branches", ElementKind::Generic, || Box::new(Passthrough))
        .add_property(PropertySpec::uint32("max-size-buffers", 200))
        .add_property(PropertySpec::uint64("max-size-time", 1_000_000_000))
}

pub fn videoconvert_metadata() -> ElementMetadata {
    ElementMetadata::new(
        "videoconvert",
        "Video format adapter",
        ElementKind::Generic,
        || Box::new(Passthrough),
    )
    .add_property(PropertySpec::double("alpha-value", 1.0).with_range(0.0, 1.0))
}

pub fn capsfilter_metadata() -> ElementMetadata {
    ElementMetadata::new("capsfilter", "Restrict stream caps", ElementKind::Generic, || {
        Box::new(CapsFilter { filter: Caps::Any })
    })
    .add_property(PropertySpec::string("caps", "ANY"))
}

pub fn input_selector_metadata() -> ElementMetadata {
    ElementMetadata::new(
        "input-selector",
        "Forward one of several inputs",
        ElementKind::InputSelector,
        || Box::new(InputSelector),
    )
    .with_sink_pads(PadTemplate::Request("sink_"))
    .add_property(PropertySpec::string("active-pad", ""))
}

pub fn output_selector_metadata() -> ElementMetadata {
    ElementMetadata::new(
        "output-selector",
        "Forward to one of several outputs",
        ElementKind::OutputSelector,
        || Box::new(OutputSelector),
    )
    .with_src_pads(PadTemplate::Request("src_"))
    .add_property(PropertySpec::string("active-pad", ""))
}

pub struct Valve;

#[async_trait]
impl ProcessingNode for Valve {
    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        if ctx.props().bool("drop") {
            ctx.record_drop();
            return Ok(());
        }
        ctx.push(0, buffer).await
    }
}

pub struct Tee;

#[async_trait]
impl ProcessingNode for Tee {
    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        ctx.send_all(StreamItem::Buffer(buffer)).await
    }
}

pub struct Passthrough;

#[async_trait]
impl ProcessingNode for Passthrough {}

pub struct CapsFilter {
    filter: Caps,
}

#[async_trait]
impl ProcessingNode for CapsFilter {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        self.filter = Caps::parse(&element.props().string("caps"))?;
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        let input = inputs.first().cloned().unwrap_or(Caps::Any);
        input
            .intersect(&self.filter)
            .ok_or_else(|| anyhow!("caps {} do not satisfy filter {}", input, self.filter))
    }
}

/// Resolve the `active-pad` property to a pad index, defaulting to the
/// first pad.
fn active_index(ctx: &NodeContext, pads: &[String]) -> Option<usize> {
    let active = ctx.props().string("active-pad");
    if active.is_empty() {
        return (!pads.is_empty()).then_some(0);
    }
    pads.iter().position(|p| *p == active)
}

pub struct InputSelector;

#[async_trait]
impl ProcessingNode for InputSelector {
    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        let mut caps = Caps::Any;
        for input in inputs {
            caps = caps
                .intersect(input)
                .ok_or_else(|| anyhow!("input-selector inputs carry different caps"))?;
        }
        Ok(caps)
    }

    async fn process(&mut self, pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let pads = ctx.element().sink_pads();
        if active_index(ctx, &pads) == Some(pad) {
            ctx.push(0, buffer).await
        } else {
            trace!(element = %ctx.element().name(), pad, "inactive input dropped");
            ctx.record_drop();
            Ok(())
        }
    }
}

pub struct OutputSelector;

#[async_trait]
impl ProcessingNode for OutputSelector {
    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let pads = ctx.element().src_pads();
        match active_index(ctx, &pads) {
            Some(index) => ctx.push(index, buffer).await,
            None => bail!("output-selector has no active pad"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsfilter_rejects_mismatch() {
        let element = Arc::new(Element::new("f", &capsfilter_metadata()));
        element.props().set_from_str("caps", "other/tensor").unwrap();
        let mut filter = CapsFilter { filter: Caps::Any };
        filter.on_create(&element, &PipelineConfig::default()).unwrap();
        let video = Caps::parse("video/x-raw,format=RGB").unwrap();
        assert!(filter.negotiate(&element, &[video], None).is_err());
        let out = filter.negotiate(&element, &[Caps::Any], None).unwrap();
        assert!(matches!(out, Caps::Tensors(_)));
    }
}
