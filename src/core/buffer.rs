use super::tensors_data::TensorsData;
use crate::error::Result;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Who releases the memory of data injected at a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// The engine takes the data over and frees it after consumption.
    AutoFree,
    /// The caller keeps ownership; the engine only borrows it while the
    /// buffer is in flight.
    DoNotFree,
}

/// One chunk of buffer memory.
#[derive(Debug, Clone)]
pub enum Memory {
    Owned(Arc<Vec<u8>>),
    /// A tensor borrowed from caller-owned data.
    Shared { data: Arc<TensorsData>, index: usize },
}

impl Memory {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Memory::Owned(Arc::new(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Memory::Owned(bytes) => bytes.as_slice(),
            Memory::Shared { data, index } => data.tensor_data(*index).unwrap_or(&[]),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Memory::Shared { .. })
    }
}

impl Deref for Memory {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Unit of data moving between elements.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    pub memories: Vec<Memory>,
    /// Position of the buffer in its stream.
    pub offset: u64,
    pub pts: Option<Duration>,
}

impl Buffer {
    pub fn new(memories: Vec<Memory>) -> Self {
        Self {
            memories,
            offset: 0,
            pts: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(vec![Memory::from_vec(bytes)])
    }

    /// Build a buffer from tensors data under the given ownership policy.
    ///
    /// `AutoFree` moves the buffers without copying when the caller holds no
    /// other reference; otherwise the memories borrow the shared data.
    pub fn from_tensors(data: Arc<TensorsData>, policy: BufferPolicy) -> Result<Self> {
        let data = match policy {
            BufferPolicy::AutoFree => match Arc::try_unwrap(data) {
                Ok(owned) => {
                    let (_, buffers) = owned.into_buffers()?;
                    return Ok(Self::new(buffers.into_iter().map(Memory::from_vec).collect()));
                }
                Err(shared) => shared,
            },
            BufferPolicy::DoNotFree => data,
        };
        for i in 0..data.count() {
            data.tensor_data(i)?;
        }
        let memories = (0..data.count())
            .map(|index| Memory::Shared {
                data: Arc::clone(&data),
                index,
            })
            .collect();
        Ok(Self::new(memories))
    }

    pub fn n_memories(&self) -> usize {
        self.memories.len()
    }

    pub fn total_size(&self) -> usize {
        self.memories.iter().map(|m| m.len()).sum()
    }

    /// All memories concatenated.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size());
        for m in &self.memories {
            out.extend_from_slice(m);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::TensorType;
    use crate::core::tensors_info::TensorsInfo;

    fn data() -> TensorsData {
        let mut info = TensorsInfo::new();
        info.set_count(1).unwrap();
        info.set_tensor_type(0, TensorType::UInt8).unwrap();
        info.set_tensor_dimension(0, &[4]).unwrap();
        let mut data = TensorsData::create(&info).unwrap();
        data.set_tensor_data(0, &[1, 2, 3, 4]).unwrap();
        data
    }

    #[test]
    fn test_auto_free_takes_unique_data() {
        let buffer = Buffer::from_tensors(Arc::new(data()), BufferPolicy::AutoFree).unwrap();
        assert!(!buffer.memories[0].is_shared());
        assert_eq!(buffer.to_contiguous(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_do_not_free_borrows() {
        let shared = Arc::new(data());
        let buffer = Buffer::from_tensors(Arc::clone(&shared), BufferPolicy::DoNotFree).unwrap();
        assert!(buffer.memories[0].is_shared());
        assert_eq!(Arc::strong_count(&shared), 2);
        drop(buffer);
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
