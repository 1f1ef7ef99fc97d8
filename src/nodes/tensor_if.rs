use super::tensor_buffer::buffer_to_tensors;
use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode};
use crate::registry::custom::{self, CustomCallback, CustomKind, CustomNodeRef};
use crate::registry::{ElementKind, ElementMetadata, PadTemplate, PropertySpec};
use crate::resilience::ErrorPolicy;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub const COMPARED_VALUES: &[(i32, &str)] = &[
    (0, "A_VALUE"),
    (1, "TENSOR_AVERAGE_VALUE"),
    (2, "CUSTOM"),
];
const CUSTOM: i32 = 2;

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new("tensor_if", "Route buffers on a condition", ElementKind::Generic, || {
        Box::new(TensorIf::new())
    })
    .with_src_pads(PadTemplate::Always(&["src_0", "src_1"]))
    .add_property(PropertySpec::enumeration("compared-value", COMPARED_VALUES, 0))
    .add_property(PropertySpec::string("compared-value-option", ""))
}

/// Sends a buffer to `src_0` when its registered condition holds, to
/// `src_1` otherwise.
pub struct TensorIf {
    condition: Option<CustomNodeRef>,
    caps: Caps,
}

impl TensorIf {
    pub fn new() -> Self {
        Self {
            condition: None,
            caps: Caps::Any,
        }
    }
}

impl Default for TensorIf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for TensorIf {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        if element.props().int32("compared-value") != CUSTOM {
            bail!("tensor_if supports only compared-value=CUSTOM");
        }
        let name = element.props().string("compared-value-option");
        self.condition = Some(custom::acquire(&name, CustomKind::IfCondition)?);
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        self.caps = inputs.first().cloned().unwrap_or(Caps::Any);
        Ok(self.caps.clone())
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::DropBuffer
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let condition = match self.condition.as_ref().map(|c| c.callback()) {
            Some(CustomCallback::IfCondition(f)) => Arc::clone(f),
            _ => return Err(anyhow!("no condition bound")),
        };
        let (data, info) = buffer_to_tensors(&buffer, &self.caps)?;
        let matched = tokio::task::block_in_place(|| condition(&data, &info))?;
        ctx.push(if matched { 0 } else { 1 }, buffer).await
    }
}
