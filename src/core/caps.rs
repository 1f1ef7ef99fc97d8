//! Stream capabilities: what kind of data flows over a link.
//!
//! Caps strings look like `video/x-raw,format=RGB,width=16,height=16` or
//! `other/tensors,num_tensors=2,dimensions=4:1.2:1,types=uint8.int16`.
//! Fields left out of a caps filter stay open and are fixed during
//! negotiation.

use super::meta::TensorFormat;
use super::tensor::{parse_dimension, TensorInfo, TensorType};
use super::tensors_info::TensorsInfo;
use anyhow::{anyhow, bail, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub num: i32,
    pub den: i32,
}

impl Fraction {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Frame period, `None` for a zero or invalid rate (no pacing).
    pub fn period(&self) -> Option<std::time::Duration> {
        if self.num <= 0 || self.den <= 0 {
            return None;
        }
        Some(std::time::Duration::from_secs_f64(self.den as f64 / self.num as f64))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (n, d) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid fraction '{}'", s))?;
        Ok(Self {
            num: n.trim().parse()?,
            den: d.trim().parse()?,
        })
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Rgb,
    Bgr,
    Rgbx,
    Bgrx,
    Rgba,
    Gray8,
}

impl VideoFormat {
    pub fn channels(self) -> u32 {
        match self {
            VideoFormat::Gray8 => 1,
            VideoFormat::Rgb | VideoFormat::Bgr => 3,
            VideoFormat::Rgbx | VideoFormat::Bgrx | VideoFormat::Rgba => 4,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "RGB" => VideoFormat::Rgb,
            "BGR" => VideoFormat::Bgr,
            "RGBx" => VideoFormat::Rgbx,
            "BGRx" => VideoFormat::Bgrx,
            "RGBA" => VideoFormat::Rgba,
            "GRAY8" => VideoFormat::Gray8,
            other => bail!("unsupported video format '{}'", other),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoFormat::Rgb => "RGB",
            VideoFormat::Bgr => "BGR",
            VideoFormat::Rgbx => "RGBx",
            VideoFormat::Bgrx => "BGRx",
            VideoFormat::Rgba => "RGBA",
            VideoFormat::Gray8 => "GRAY8",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoCaps {
    pub format: Option<VideoFormat>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<Fraction>,
}

impl VideoCaps {
    /// Bytes per frame once format, width and height are fixed.
    pub fn frame_size(&self) -> Option<usize> {
        Some(self.format?.channels() as usize * self.width? as usize * self.height? as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorCaps {
    pub format: TensorFormat,
    /// Negotiated layout; always `None` for flexible streams.
    pub info: Option<TensorsInfo>,
    pub framerate: Option<Fraction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Caps {
    Any,
    Video(VideoCaps),
    Tensors(TensorCaps),
}

fn merge<T: PartialEq + Clone>(a: &Option<T>, b: &Option<T>) -> Option<Option<T>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => None,
        (Some(x), _) => Some(Some(x.clone())),
        (None, y) => Some(y.clone()),
    }
}

impl Caps {
    pub fn static_tensors(info: TensorsInfo) -> Self {
        Caps::Tensors(TensorCaps {
            format: TensorFormat::Static,
            info: Some(info),
            framerate: None,
        })
    }

    pub fn flexible_tensors() -> Self {
        Caps::Tensors(TensorCaps {
            format: TensorFormat::Flexible,
            info: None,
            framerate: None,
        })
    }

    /// Common subset of two caps, `None` when they cannot both hold.
    pub fn intersect(&self, other: &Caps) -> Option<Caps> {
        match (self, other) {
            (Caps::Any, c) | (c, Caps::Any) => Some(c.clone()),
            (Caps::Video(a), Caps::Video(b)) => Some(Caps::Video(VideoCaps {
                format: merge(&a.format, &b.format)?,
                width: merge(&a.width, &b.width)?,
                height: merge(&a.height, &b.height)?,
                framerate: merge(&a.framerate, &b.framerate)?,
            })),
            (Caps::Tensors(a), Caps::Tensors(b)) => {
                if a.format != b.format {
                    return None;
                }
                let info = match (&a.info, &b.info) {
                    (Some(x), Some(y)) if !x.is_equal(y) => return None,
                    (Some(x), _) => Some(x.clone()),
                    (None, y) => y.clone(),
                };
                Some(Caps::Tensors(TensorCaps {
                    format: a.format,
                    info,
                    framerate: merge(&a.framerate, &b.framerate)?,
                }))
            }
            _ => None,
        }
    }

    pub fn tensors_info(&self) -> Option<&TensorsInfo> {
        match self {
            Caps::Tensors(t) => t.info.as_ref(),
            _ => None,
        }
    }

    pub fn is_flexible(&self) -> bool {
        matches!(self, Caps::Tensors(t) if t.format == TensorFormat::Flexible)
    }

    pub fn parse(s: &str) -> Result<Caps> {
        let mut parts = split_fields(s.trim()).into_iter();
        let media = parts.next().ok_or_else(|| anyhow!("empty caps"))?;
        let mut fields = Vec::new();
        for part in parts {
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("caps field '{}' has no value", part))?;
            fields.push((k.trim().to_string(), strip_value(v)));
        }

        match media.trim() {
            "ANY" => Ok(Caps::Any),
            "video/x-raw" => {
                for (k, _) in &fields {
                    if !matches!(k.as_str(), "format" | "width" | "height" | "framerate") {
                        bail!("unknown video caps field '{}'", k);
                    }
                }
                Ok(Caps::Video(VideoCaps {
                    format: lookup(&fields, "format").map(VideoFormat::parse).transpose()?,
                    width: lookup(&fields, "width").map(str::parse).transpose()?,
                    height: lookup(&fields, "height").map(str::parse).transpose()?,
                    framerate: lookup(&fields, "framerate").map(Fraction::parse).transpose()?,
                }))
            }
            "other/tensor" => {
                let framerate = lookup(&fields, "framerate").map(Fraction::parse).transpose()?;
                let info = match (lookup(&fields, "dimension"), lookup(&fields, "type")) {
                    (Some(dim), Some(ty)) => {
                        let t: TensorType = ty.parse().map_err(|e: String| anyhow!(e))?;
                        let d = parse_dimension(dim).map_err(|e| anyhow!(e))?;
                        Some(
                            TensorsInfo::from_infos(vec![TensorInfo::new(t, &d)])
                                .map_err(|e| anyhow!(e))?,
                        )
                    }
                    (None, None) => None,
                    _ => bail!("other/tensor caps need both dimension and type"),
                };
                Ok(Caps::Tensors(TensorCaps {
                    format: TensorFormat::Static,
                    info,
                    framerate,
                }))
            }
            "other/tensors" => {
                let format = match lookup(&fields, "format").unwrap_or("static") {
                    "static" => TensorFormat::Static,
                    "flexible" => TensorFormat::Flexible,
                    other => bail!("unsupported tensor format '{}'", other),
                };
                let framerate = lookup(&fields, "framerate").map(Fraction::parse).transpose()?;
                if format == TensorFormat::Flexible {
                    return Ok(Caps::Tensors(TensorCaps {
                        format,
                        info: None,
                        framerate,
                    }));
                }
                let info = match (lookup(&fields, "dimensions"), lookup(&fields, "types")) {
                    (Some(dims), Some(types)) => Some(parse_tensors(lookup(&fields, "num_tensors"), dims, types)?),
                    (None, None) => None,
                    _ => bail!("other/tensors caps need both dimensions and types"),
                };
                Ok(Caps::Tensors(TensorCaps {
                    format,
                    info,
                    framerate,
                }))
            }
            other => bail!("unsupported media type '{}'", other),
        }
    }
}

fn lookup<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn parse_tensors(num: Option<&str>, dims: &str, types: &str) -> Result<TensorsInfo> {
    let dims: Vec<&str> = dims.split('.').collect();
    let types: Vec<&str> = types.split('.').collect();
    if dims.len() != types.len() {
        bail!("{} dimensions but {} types", dims.len(), types.len());
    }
    if let Some(n) = num {
        let n: usize = n.parse()?;
        if n != dims.len() {
            bail!("num_tensors={} but {} tensors described", n, dims.len());
        }
    }
    let infos = dims
        .iter()
        .zip(types.iter())
        .map(|(d, t)| {
            let t: TensorType = t.parse().map_err(|e: String| anyhow!(e))?;
            let d = parse_dimension(d).map_err(|e| anyhow!(e))?;
            Ok(TensorInfo::new(t, &d))
        })
        .collect::<Result<Vec<_>>>()?;
    TensorsInfo::from_infos(infos).map_err(|e| anyhow!(e))
}

/// Split on commas outside of quotes.
fn split_fields(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => out.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out
}

/// Drop a leading `(type)` annotation and surrounding whitespace.
fn strip_value(v: &str) -> String {
    let v = v.trim();
    let v = match (v.starts_with('('), v.find(')')) {
        (true, Some(end)) => &v[end + 1..],
        _ => v,
    };
    v.trim().to_string()
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caps::Any => f.write_str("ANY"),
            Caps::Video(v) => {
                f.write_str("video/x-raw")?;
                if let Some(fmt_) = v.format {
                    write!(f, ",format={}", fmt_.name())?;
                }
                if let Some(w) = v.width {
                    write!(f, ",width={}", w)?;
                }
                if let Some(h) = v.height {
                    write!(f, ",height={}", h)?;
                }
                if let Some(r) = v.framerate {
                    write!(f, ",framerate={}", r)?;
                }
                Ok(())
            }
            Caps::Tensors(t) => {
                f.write_str("other/tensors")?;
                match t.format {
                    TensorFormat::Flexible => f.write_str(",format=flexible")?,
                    TensorFormat::Static => {
                        f.write_str(",format=static")?;
                        if let Some(info) = &t.info {
                            write!(
                                f,
                                ",num_tensors={},dimensions={},types={}",
                                info.count(),
                                info.dimensions_string(),
                                info.types_string()
                            )?;
                        }
                    }
                }
                if let Some(r) = t.framerate {
                    write!(f, ",framerate={}", r)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_tensor() {
        let caps =
            Caps::parse("other/tensor,dimension=(string)10:1:1:1,type=(string)int32,framerate=(fraction)0/1")
                .unwrap();
        let info = caps.tensors_info().unwrap();
        assert_eq!(info.count(), 1);
        assert_eq!(info.tensor_type(0).unwrap(), TensorType::Int32);
        assert_eq!(info.tensor_size(0).unwrap(), 40);
    }

    #[test]
    fn test_parse_multi_and_flexible() {
        let caps = Caps::parse("other/tensors,num_tensors=2,dimensions=4:1.2:2,types=uint8.int16").unwrap();
        let info = caps.tensors_info().unwrap();
        assert_eq!(info.count(), 2);
        assert_eq!(info.tensor_size(-1).unwrap(), 4 + 8);

        let flex = Caps::parse("other/tensors,format=flexible").unwrap();
        assert!(flex.is_flexible());
        assert!(flex.tensors_info().is_none());

        assert!(Caps::parse("other/tensors,num_tensors=3,dimensions=4.4,types=uint8.uint8").is_err());
        assert!(Caps::parse("audio/x-raw").is_err());
    }

    #[test]
    fn test_video_intersection() {
        let filter = Caps::parse("video/x-raw,format=RGBx,width=16,height=16,framerate=10/1").unwrap();
        let fixed = Caps::Any.intersect(&filter).unwrap();
        match &fixed {
            Caps::Video(v) => assert_eq!(v.frame_size(), Some(16 * 16 * 4)),
            _ => panic!("expected video caps"),
        }

        let other = Caps::parse("video/x-raw,width=32").unwrap();
        assert!(fixed.intersect(&other).is_none());

        let tensor = Caps::parse("other/tensor").unwrap();
        assert!(fixed.intersect(&tensor).is_none());
    }
}
