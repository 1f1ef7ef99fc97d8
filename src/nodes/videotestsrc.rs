use crate::config::PipelineConfig;
use crate::core::{Buffer, Caps, Element, Fraction, NodeContext, ProcessingNode, VideoCaps, VideoFormat};
use crate::registry::{ElementKind, ElementMetadata, PadTemplate, PropertySpec};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const PATTERNS: &[(i32, &str)] = &[
    (0, "smpte"),
    (1, "snow"),
    (2, "black"),
    (3, "white"),
    (4, "red"),
    (5, "green"),
    (6, "blue"),
];

// SMPTE bar colors, left to right.
const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

pub fn metadata() -> ElementMetadata {
    ElementMetadata::new("videotestsrc", "Video test pattern source", ElementKind::Generic, || {
        Box::new(VideoTestSrc::new())
    })
    .with_sink_pads(PadTemplate::None)
    .add_property(PropertySpec::int32("num-buffers", -1).with_range(-1.0, i32::MAX as f64))
    .add_property(PropertySpec::bool("is-live", false))
    .add_property(PropertySpec::enumeration("pattern", PATTERNS, 0))
    .add_property(PropertySpec::int32("width", 320).with_range(1.0, 16384.0))
    .add_property(PropertySpec::int32("height", 240).with_range(1.0, 16384.0))
    .add_property(PropertySpec::string("framerate", "30/1"))
    .add_property(PropertySpec::int64("timestamp-offset", 0))
}

pub struct VideoTestSrc {
    caps: VideoCaps,
    produced: u64,
    next_deadline: Option<Instant>,
    noise: u32,
}

impl VideoTestSrc {
    pub fn new() -> Self {
        Self {
            caps: VideoCaps::default(),
            produced: 0,
            next_deadline: None,
            noise: 0x1234_5678,
        }
    }

    fn render(&mut self, pattern: i32) -> Vec<u8> {
        let format = self.caps.format.unwrap_or(VideoFormat::Rgb);
        let channels = format.channels() as usize;
        let width = self.caps.width.unwrap_or(1) as usize;
        let height = self.caps.height.unwrap_or(1) as usize;
        let mut frame = vec![0u8; channels * width * height];

        for y in 0..height {
            for x in 0..width {
                let rgb = match pattern {
                    0 => BARS[x * BARS.len() / width],
                    1 => {
                        self.noise = self.noise.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                        let v = (self.noise >> 16) as u8;
                        [v, v, v]
                    }
                    3 => [255, 255, 255],
                    4 => [255, 0, 0],
                    5 => [0, 255, 0],
                    6 => [0, 0, 255],
                    _ => [0, 0, 0],
                };
                let px = &mut frame[(y * width + x) * channels..][..channels];
                write_pixel(px, format, rgb);
            }
        }
        frame
    }
}

fn write_pixel(px: &mut [u8], format: VideoFormat, [r, g, b]: [u8; 3]) {
    match format {
        VideoFormat::Rgb | VideoFormat::Rgbx | VideoFormat::Rgba => {
            px[..3].copy_from_slice(&[r, g, b]);
            if px.len() == 4 {
                px[3] = 255;
            }
        }
        VideoFormat::Bgr | VideoFormat::Bgrx => {
            px[..3].copy_from_slice(&[b, g, r]);
            if px.len() == 4 {
                px[3] = 255;
            }
        }
        VideoFormat::Gray8 => {
            px[0] = ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8;
        }
    }
}

impl Default for VideoTestSrc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingNode for VideoTestSrc {
    fn on_create(&mut self, element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        Fraction::parse(&element.props().string("framerate"))?;
        Ok(())
    }

    fn negotiate(&mut self, element: &Element, _inputs: &[Caps], hint: Option<&Caps>) -> Result<Caps> {
        let props = element.props();
        let own = VideoCaps {
            format: Some(VideoFormat::Rgb),
            width: Some(props.int32("width") as u32),
            height: Some(props.int32("height") as u32),
            framerate: Some(Fraction::parse(&props.string("framerate"))?),
        };
        // Caps asked for downstream win over the element defaults.
        self.caps = match hint {
            Some(Caps::Video(wanted)) => VideoCaps {
                format: wanted.format.or(own.format),
                width: wanted.width.or(own.width),
                height: wanted.height.or(own.height),
                framerate: wanted.framerate.or(own.framerate),
            },
            Some(Caps::Any) | None => own,
            Some(other) => return Err(anyhow!("videotestsrc cannot produce {}", other)),
        };
        Ok(Caps::Video(self.caps.clone()))
    }

    fn is_source(&self) -> bool {
        true
    }

    async fn produce(&mut self, ctx: &mut NodeContext) -> Result<Option<Buffer>> {
        let limit = ctx.props().int32("num-buffers");
        if limit >= 0 && self.produced >= limit as u64 {
            return Ok(None);
        }

        let period = self
            .caps
            .framerate
            .and_then(|f| f.period())
            .unwrap_or(Duration::from_millis(33));
        if ctx.props().bool("is-live") {
            let deadline = self.next_deadline.unwrap_or_else(Instant::now);
            tokio::time::sleep_until(deadline).await;
            // Paused time is not caught up with a burst of frames.
            let now = Instant::now();
            self.next_deadline = Some(if deadline + period < now { now } else { deadline + period });
        } else {
            tokio::task::yield_now().await;
        }

        let mut buffer = Buffer::from_bytes(self.render(ctx.props().int32("pattern")));
        buffer.offset = self.produced;
        buffer.pts = Some(period * self.produced as u32);
        self.produced += 1;
        Ok(Some(buffer))
    }
}
