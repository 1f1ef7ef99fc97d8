//! Conversions between engine buffers and tensors data.

use crate::core::{Buffer, Caps, Memory, TensorInfo, TensorMetaHeader, TensorType, TensorsData, TensorsInfo, SIZE_LIMIT};
use anyhow::{anyhow, bail, Result};

/// Interpret `buffer` under the negotiated `caps`.
///
/// Static streams are split by the negotiated layout, flexible streams are
/// described by the header of each memory, and anything else is exposed as
/// one `uint8` tensor per memory.
pub fn buffer_to_tensors(buffer: &Buffer, caps: &Caps) -> Result<(TensorsData, TensorsInfo)> {
    if caps.is_flexible() {
        return flexible_to_tensors(buffer);
    }
    if let Some(info) = caps.tensors_info() {
        return static_to_tensors(buffer, info);
    }

    if buffer.n_memories() == 0 || buffer.n_memories() > SIZE_LIMIT {
        bail!("buffer with {} memories cannot be exposed as tensors", buffer.n_memories());
    }
    let mut infos = Vec::with_capacity(buffer.n_memories());
    let mut buffers = Vec::with_capacity(buffer.n_memories());
    for memory in &buffer.memories {
        if memory.is_empty() {
            bail!("empty memory in raw buffer");
        }
        infos.push(TensorInfo::new(TensorType::UInt8, &[memory.len() as u32]));
        buffers.push(memory.to_vec());
    }
    let info = TensorsInfo::from_infos(infos)?;
    let data = TensorsData::from_buffers(info.clone(), buffers)?;
    Ok((data, info))
}

fn static_to_tensors(buffer: &Buffer, info: &TensorsInfo) -> Result<(TensorsData, TensorsInfo)> {
    let sizes: Vec<usize> = (0..info.count())
        .map(|i| info.tensor_size(i as i32))
        .collect::<crate::error::Result<_>>()?;

    let per_memory = buffer.n_memories() == sizes.len()
        && buffer.memories.iter().zip(&sizes).all(|(m, s)| m.len() == *s);
    let buffers = if per_memory {
        buffer.memories.iter().map(|m| m.to_vec()).collect()
    } else {
        let flat = buffer.to_contiguous();
        let expected: usize = sizes.iter().sum();
        if flat.len() != expected {
            bail!("buffer holds {} bytes, negotiated layout needs {}", flat.len(), expected);
        }
        let mut at = 0;
        sizes
            .iter()
            .map(|s| {
                let chunk = flat[at..at + s].to_vec();
                at += s;
                chunk
            })
            .collect()
    };
    let data = TensorsData::from_buffers(info.clone(), buffers)?;
    Ok((data, info.clone()))
}

fn flexible_to_tensors(buffer: &Buffer) -> Result<(TensorsData, TensorsInfo)> {
    let mut infos = Vec::with_capacity(buffer.n_memories());
    let mut buffers = Vec::with_capacity(buffer.n_memories());
    for memory in &buffer.memories {
        let (tensor, payload) = TensorMetaHeader::unwrap(memory)?;
        infos.push(tensor);
        buffers.push(payload.to_vec());
    }
    let info = TensorsInfo::from_infos(infos).map_err(|e| anyhow!("flexible buffer: {}", e))?;
    let data = TensorsData::from_buffers(info.clone(), buffers)?;
    Ok((data, info))
}

/// Turn owned tensors into a buffer, one memory per tensor.
pub fn tensors_to_buffer(data: TensorsData) -> Result<Buffer> {
    let (_, buffers) = data.into_buffers()?;
    Ok(Buffer::new(buffers.into_iter().map(Memory::from_vec).collect()))
}

/// Prefix every memory of `buffer` with a header describing `info`.
pub fn to_flexible(buffer: &Buffer, info: &TensorsInfo) -> Result<Buffer> {
    if buffer.n_memories() != info.count() {
        bail!(
            "{} memories cannot carry {} flexible tensors",
            buffer.n_memories(),
            info.count()
        );
    }
    let memories = buffer
        .memories
        .iter()
        .zip(info.infos())
        .map(|(m, t)| Memory::from_vec(TensorMetaHeader::wrap(t, m)))
        .collect();
    Ok(Buffer::new(memories))
}
