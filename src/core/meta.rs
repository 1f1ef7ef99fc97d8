//! Per-tensor header carried by every memory chunk of a flexible stream.
//!
//! Layout (little endian, 128 bytes):
//!
//! ```text
//! 0   magic        u32
//! 4   version      u32
//! 8   type         u32
//! 12  dimension    u32 x 16   (0 terminates the rank)
//! 76  format       u32
//! 80  media type   u32
//! 84  reserved     zero padding
//! ```

use super::tensor::{TensorInfo, TensorType, RANK_LIMIT_EXTENDED};
use anyhow::{anyhow, bail, Result};

pub const META_MAGIC: u32 = 0xfeed_cced;
pub const META_VERSION: u32 = 1;
pub const META_HEADER_SIZE: usize = 128;

/// Stream format of tensor memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TensorFormat {
    Static = 0,
    Flexible = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorMetaHeader {
    pub tensor_type: TensorType,
    pub dimension: Vec<u32>,
    pub format: TensorFormat,
    pub media_type: u32,
}

impl TensorMetaHeader {
    pub fn from_info(info: &TensorInfo) -> Self {
        Self {
            tensor_type: info.tensor_type,
            dimension: info.dimension.clone(),
            format: TensorFormat::Flexible,
            media_type: 0,
        }
    }

    pub fn to_info(&self) -> TensorInfo {
        TensorInfo::new(self.tensor_type, &self.dimension)
    }

    pub fn encode(&self) -> [u8; META_HEADER_SIZE] {
        let mut out = [0u8; META_HEADER_SIZE];
        out[0..4].copy_from_slice(&META_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&META_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&(self.tensor_type as u32).to_le_bytes());
        for (i, d) in self.dimension.iter().take(RANK_LIMIT_EXTENDED).enumerate() {
            let at = 12 + i * 4;
            out[at..at + 4].copy_from_slice(&d.to_le_bytes());
        }
        out[76..80].copy_from_slice(&(self.format as u32).to_le_bytes());
        out[80..84].copy_from_slice(&self.media_type.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_HEADER_SIZE {
            bail!("memory of {} bytes is too short for a tensor header", bytes.len());
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        if word(0) != META_MAGIC {
            bail!("tensor header magic mismatch: {:#x}", word(0));
        }
        let tensor_type = TensorType::from_u32(word(8));
        if tensor_type == TensorType::Unknown {
            bail!("tensor header carries unknown type {}", word(8));
        }
        let dimension: Vec<u32> = (0..RANK_LIMIT_EXTENDED)
            .map(|i| word(12 + i * 4))
            .take_while(|&d| d != 0)
            .collect();
        if dimension.is_empty() {
            bail!("tensor header has an empty dimension");
        }
        let format = match word(76) {
            0 => TensorFormat::Static,
            1 => TensorFormat::Flexible,
            other => return Err(anyhow!("unsupported tensor format {}", other)),
        };
        Ok(Self {
            tensor_type,
            dimension,
            format,
            media_type: word(80),
        })
    }

    /// Prepend a header describing `info` to `payload`.
    pub fn wrap(info: &TensorInfo, payload: &[u8]) -> Vec<u8> {
        let header = Self::from_info(info).encode();
        let mut out = Vec::with_capacity(META_HEADER_SIZE + payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(payload);
        out
    }

    /// Split a flexible memory into its descriptor and payload, checking the
    /// payload length against the header.
    pub fn unwrap(memory: &[u8]) -> Result<(TensorInfo, &[u8])> {
        let header = Self::decode(memory)?;
        let info = header.to_info();
        let payload = &memory[META_HEADER_SIZE..];
        let Some(declared) = info.byte_size() else {
            bail!("flexible tensor header declares an unaddressable size");
        };
        if payload.len() != declared {
            bail!(
                "flexible tensor payload is {} bytes, header declares {}",
                payload.len(),
                declared
            );
        }
        Ok((info, payload))
    }
}
