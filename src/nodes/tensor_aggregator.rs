use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, NodeContext, ProcessingNode, TensorCaps, TensorInfo, TensorsInfo, RANK_LIMIT};
use crate::registry::{ElementKind, ElementMetadata, PropertySpec};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new(
        "tensor_aggregator",
        "Collect frames into bigger tensors",
        ElementKind::Generic,
        || Box::new(TensorAggregator::new()),
    )
    .add_property(PropertySpec::uint32("frames-in", 1).with_range(1.0, u32::MAX as f64))
    .add_property(PropertySpec::uint32("frames-out", 1).with_range(1.0, u32::MAX as f64))
    .add_property(PropertySpec::uint32("frames-flush", 0))
    .add_property(PropertySpec::uint32("frames-dim", (RANK_LIMIT - 1) as u32).with_range(0.0, 15.0))
    .add_property(PropertySpec::bool("concat", true))
}

/// Sliding window over incoming frames.
///
/// Every `frames-out` frames are concatenated along `frames-dim` into one
/// output tensor, after which `frames-flush` frames (default `frames-out`)
/// leave the window.
pub struct TensorAggregator {
    frames_in: usize,
    frames_out: usize,
    frames_flush: usize,
    frames_dim: usize,
    concat: bool,
    // Input frame layout, one frame per entry.
    frame_dims: Vec<u32>,
    element_size: usize,
    frame_size: usize,
    window: VecDeque<Vec<u8>>,
}

impl TensorAggregator {
    pub fn new() -> Self {
        Self {
            frames_in: 1,
            frames_out: 1,
            frames_flush: 1,
            frames_dim: RANK_LIMIT - 1,
            concat: true,
            frame_dims: Vec::new(),
            element_size: 1,
            frame_size: 0,
            window: VecDeque::new(),
        }
    }

    /// Concatenate `frames` along `frames_dim`: for every index above that
    /// dimension, the blocks of all frames are laid out one after another.
    fn concat_frames(&self, frames: &[&Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frame_size * frames.len());
        if !self.concat {
            for f in frames {
                out.extend_from_slice(f);
            }
            return out;
        }
        let block = self.element_size
            * self.frame_dims[..=self.frames_dim]
                .iter()
                .map(|&d| d as usize)
                .product::<usize>();
        let outer = self.frame_size / block.max(1);
        for o in 0..outer {
            for f in frames {
                out.extend_from_slice(&f[o * block..(o + 1) * block]);
            }
        }
        out
    }
}

impl Default for TensorAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for TensorAggregator {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        let props = element.props();
        self.frames_in = props.uint32("frames-in").max(1) as usize;
        self.frames_out = props.uint32("frames-out").max(1) as usize;
        self.frames_flush = match props.uint32("frames-flush") {
            0 => self.frames_out,
            n => n as usize,
        };
        self.frames_dim = props.uint32("frames-dim") as usize;
        self.concat = props.bool("concat");
        Ok(())
    }

    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        let (input, framerate) = match inputs.first() {
            Some(Caps::Tensors(TensorCaps { info: Some(info), framerate, .. })) if info.count() == 1 => {
                (info.tensor_info(0)?.clone(), *framerate)
            }
            Some(other) => bail!("tensor_aggregator needs a single static tensor, got {}", other),
            None => bail!("tensor_aggregator is not linked"),
        };

        let mut dims = input.dimension.clone();
        if self.frames_dim >= dims.len() {
            dims.resize(self.frames_dim + 1, 1);
        }
        let along = dims[self.frames_dim] as usize;
        if along % self.frames_in != 0 {
            bail!(
                "dimension {} of size {} does not split into {} frames",
                self.frames_dim,
                along,
                self.frames_in
            );
        }
        dims[self.frames_dim] = (along / self.frames_in) as u32;
        self.frame_dims = dims.clone();
        self.element_size = input.tensor_type.element_size();
        let Some(total) = input.byte_size() else {
            bail!("input tensor is too large to aggregate");
        };
        self.frame_size = total / self.frames_in;

        let out_dim = if self.concat {
            self.frames_dim
        } else {
            dims.len() - 1
        };
        dims[out_dim] = u32::try_from(self.frames_out)
            .ok()
            .and_then(|n| dims[out_dim].checked_mul(n))
            .ok_or_else(|| anyhow!("frames-out {} overflows dimension {}", self.frames_out, out_dim))?;
        let out = TensorInfo::new(input.tensor_type, &dims);
        Ok(Caps::Tensors(TensorCaps {
            format: crate::core::TensorFormat::Static,
            info: Some(TensorsInfo::from_infos(vec![out]).map_err(|e| anyhow!(e))?),
            framerate,
        }))
    }

    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        let bytes = buffer.to_contiguous();
        if self.frame_size == 0 || bytes.len() != self.frame_size * self.frames_in {
            bail!(
                "buffer of {} bytes does not hold {} frames of {} bytes",
                bytes.len(),
                self.frames_in,
                self.frame_size
            );
        }
        for frame in bytes.chunks(self.frame_size) {
            self.window.push_back(frame.to_vec());
        }

        while self.window.len() >= self.frames_out {
            let frames: Vec<&Vec<u8>> = self.window.iter().take(self.frames_out).collect();
            let mut out = Buffer::from_bytes(self.concat_frames(&frames));
            out.offset = buffer.offset;
            out.pts = buffer.pts;
            let drain = self.frames_flush.min(self.window.len());
            self.window.drain(..drain);
            ctx.push(0, out).await?;
        }
        Ok(())
    }

    async fn flush(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        self.window.clear();
        Ok(())
    }
}
