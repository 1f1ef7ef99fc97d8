use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode, TensorCaps, TensorFormat, TensorInfo, TensorType, TensorsInfo};
use crate::registry::{ElementKind, ElementMetadata, PropertySpec};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new("tensor_converter", "Convert media frames to tensors", ElementKind::Generic, || {
        Box::new(TensorConverter::new())
    })
    .add_property(PropertySpec::uint32("frames-per-tensor", 1).with_range(1.0, 1024.0))
}

/// Video frames become `uint8` tensors of `channels:width:height:frames`;
/// tensor streams pass through unchanged.
pub struct TensorConverter {
    frames_per_tensor: usize,
    frame_size: usize,
    video: bool,
    pending: Vec<u8>,
    pending_frames: usize,
}

impl TensorConverter {
    pub fn new() -> Self {
        Self {
            frames_per_tensor: 1,
            frame_size: 0,
            video: false,
            pending: Vec::new(),
            pending_frames: 0,
        }
    }
}

impl Default for TensorConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for TensorConverter {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        self.frames_per_tensor = element.props().uint32("frames-per-tensor").max(1) as usize;
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        match inputs.first() {
            Some(Caps::Video(video)) => {
                let format = video.format.ok_or_else(|| anyhow!("video format is not fixed"))?;
                let (width, height) = video
                    .width
                    .zip(video.height)
                    .ok_or_else(|| anyhow!("video size is not fixed"))?;
                self.video = true;
                self.frame_size = video.frame_size().unwrap_or(0);
                let tensor = TensorInfo::new(
                    TensorType::UInt8,
                    &[format.channels(), width, height, self.frames_per_tensor as u32],
                );
                Ok(Caps::Tensors(TensorCaps {
                    format: TensorFormat::Static,
                    info: Some(TensorsInfo::from_infos(vec![tensor])?),
                    framerate: video.framerate,
                }))
            }
            Some(tensors @ Caps::Tensors(_)) => Ok(tensors.clone()),
            Some(Caps::Any) | None => bail!("tensor_converter needs fixed input caps"),
        }
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        if !self.video || self.frames_per_tensor == 1 {
            return ctx.push(0, buffer).await;
        }
        let bytes = buffer.to_contiguous();
        if bytes.len() != self.frame_size {
            bail!("frame of {} bytes, expected {}", bytes.len(), self.frame_size);
        }
        self.pending.extend_from_slice(&bytes);
        self.pending_frames += 1;
        if self.pending_frames < self.frames_per_tensor {
            return Ok(());
        }
        self.pending_frames = 0;
        let mut out = Buffer::from_bytes(std::mem::take(&mut self.pending));
        out.offset = buffer.offset;
        out.pts = buffer.pts;
        ctx.push(0, out).await
    }

    async fn flush(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        self.pending.clear();
        self.pending_frames = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_caps_to_tensor() {
        let element = Element::new("conv", &metadata());
        let mut conv = TensorConverter::new();
        let input = Caps::parse("video/x-raw,format=RGBx,width=16,height=16,framerate=10/1").unwrap();
        let out = conv.negotiate(&element, &[input], None).unwrap();
        let info = out.tensors_info().unwrap();
        assert_eq!(info.tensor_dimension(0).unwrap(), &[4, 16, 16, 1]);
        assert_eq!(info.tensor_size(0).unwrap(), 1024);
    }

    #[test]
    fn test_any_input_rejected() {
        let element = Element::new("conv", &metadata());
        let mut conv = TensorConverter::new();
        assert!(conv.negotiate(&element, &[Caps::Any], None).is_err());
        assert!(conv
            .negotiate(&element, &[Caps::parse("video/x-raw,format=RGB").unwrap()], None)
            .is_err());
    }
}
