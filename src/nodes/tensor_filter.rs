use super::tensor_buffer::{buffer_to_tensors, tensors_to_buffer};
use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode, TensorsData, TensorsInfo};
use crate::registry::custom::{self, CustomCallback, CustomKind, CustomNodeRef};
use crate::registry::{ElementKind, ElementMetadata, PropertySpec};
use crate::resilience::ErrorPolicy;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const EASY_FRAMEWORKS: &[&str] = &["custom-easy", "custom_easy"];

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new("tensor_filter", "Run a model on tensors", ElementKind::Generic, || {
        Box::new(TensorFilter::new())
    })
    .add_property(PropertySpec::string("framework", ""))
    .add_property(PropertySpec::string("model", ""))
    .add_property(PropertySpec::bool("silent", true))
}

/// Invokes a registered easy filter on every buffer.
pub struct TensorFilter {
    model: Option<CustomNodeRef>,
    in_info: TensorsInfo,
    out_info: TensorsInfo,
}

impl TensorFilter {
    pub fn new() -> Self {
        Self {
            model: None,
            in_info: TensorsInfo::new(),
            out_info: TensorsInfo::new(),
        }
    }
}

impl Default for TensorFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for TensorFilter {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        let framework = element.props().string("framework");
        if !EASY_FRAMEWORKS.contains(&framework.as_str()) {
            bail!("framework '{}' is not available", framework);
        }
        let model = element.props().string("model");
        let used = custom::acquire(&model, CustomKind::EasyFilter)?;
        if let CustomCallback::EasyFilter { in_info, out_info, .. } = used.callback() {
            self.in_info = in_info.clone();
            self.out_info = out_info.clone();
        }
        debug!(element = %element.name(), model = %model, "easy filter bound");
        self.model = Some(used);
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        match inputs.first() {
            Some(Caps::Any) | None => {}
            Some(caps) => match caps.tensors_info() {
                Some(info) if info.is_equal(&self.in_info) => {}
                _ => bail!("model input {} does not accept {}", self.in_info.dimensions_string(), caps),
            },
        }
        Ok(Caps::static_tensors(self.out_info.clone()))
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::DropBuffer
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let invoke = match self.model.as_ref().map(|m| m.callback()) {
            Some(CustomCallback::EasyFilter { invoke, .. }) => Arc::clone(invoke),
            _ => return Err(anyhow!("no model bound")),
        };
        let (input, _) = buffer_to_tensors(&buffer, &Caps::static_tensors(self.in_info.clone()))?;
        let mut output = TensorsData::create(&self.out_info)?;
        tokio::task::block_in_place(|| invoke(&input, &mut output))?;

        let mut out = tensors_to_buffer(output)?;
        out.offset = buffer.offset;
        out.pts = buffer.pts;
        ctx.push(0, out).await
    }
}
