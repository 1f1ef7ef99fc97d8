use super::tensors_info::TensorsInfo;
use crate::error::{MlError, Result};

/// Owned buffers for every tensor described by a [`TensorsInfo`].
///
/// `Clone` is a deep copy: the clone owns its own buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorsData {
    info: TensorsInfo,
    tensors: Vec<Option<Vec<u8>>>,
}

impl TensorsData {
    /// Allocate zeroed buffers sized from `info`.
    pub fn create(info: &TensorsInfo) -> Result<Self> {
        if !info.validate() {
            return Err(MlError::invalid("cannot create tensors data from an invalid info"));
        }
        let tensors: Vec<Option<Vec<u8>>> = (0..info.count())
            .map(|i| info.tensor_size(i as i32).map(|size| Some(vec![0u8; size])))
            .collect::<Result<_>>()?;
        Ok(Self {
            info: info.clone(),
            tensors,
        })
    }

    /// Create the data shell without allocating buffers. Buffers are attached
    /// later with [`TensorsData::set_tensor_data`] or supplied by the engine.
    pub fn create_no_alloc(info: &TensorsInfo) -> Result<Self> {
        if !info.validate() {
            return Err(MlError::invalid("cannot create tensors data from an invalid info"));
        }
        Ok(Self {
            info: info.clone(),
            tensors: vec![None; info.count()],
        })
    }

    /// Wrap buffers the engine already owns; each buffer must match the size
    /// declared by `info`.
    pub(crate) fn from_buffers(info: TensorsInfo, buffers: Vec<Vec<u8>>) -> Result<Self> {
        if buffers.len() != info.count() {
            return Err(MlError::invalid(format!(
                "buffer count {} does not match tensor count {}",
                buffers.len(),
                info.count()
            )));
        }
        for (i, buf) in buffers.iter().enumerate() {
            let expected = info.tensor_size(i as i32)?;
            if buf.len() != expected {
                return Err(MlError::invalid(format!(
                    "tensor {} has {} bytes, expected {}",
                    i,
                    buf.len(),
                    expected
                )));
            }
        }
        Ok(Self {
            info,
            tensors: buffers.into_iter().map(Some).collect(),
        })
    }

    pub fn info(&self) -> &TensorsInfo {
        &self.info
    }

    pub fn count(&self) -> usize {
        self.tensors.len()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.tensors.len() {
            return Err(MlError::invalid(format!(
                "tensor index {} out of range (count {})",
                index,
                self.tensors.len()
            )));
        }
        Ok(())
    }

    pub fn tensor_data(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        self.tensors[index]
            .as_deref()
            .ok_or_else(|| MlError::invalid(format!("tensor {} has no buffer", index)))
    }

    /// In-place access to an allocated buffer.
    pub fn tensor_data_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.check_index(index)?;
        self.tensors[index]
            .as_deref_mut()
            .ok_or_else(|| MlError::invalid(format!("tensor {} has no buffer", index)))
    }

    /// Copy `data` into tensor `index`. The length must equal the declared
    /// tensor size.
    pub fn set_tensor_data(&mut self, index: usize, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        let expected = self.info.tensor_size(index as i32)?;
        if data.len() != expected {
            return Err(MlError::invalid(format!(
                "tensor {} expects {} bytes, got {}",
                index,
                expected,
                data.len()
            )));
        }
        match &mut self.tensors[index] {
            Some(buf) => buf.copy_from_slice(data),
            slot @ None => *slot = Some(data.to_vec()),
        }
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.tensors.iter().all(Option::is_some)
    }

    /// Total bytes currently held.
    pub fn total_size(&self) -> usize {
        self.tensors.iter().flatten().map(Vec::len).sum()
    }

    /// Take the buffers out; unallocated tensors fail.
    pub(crate) fn into_buffers(self) -> Result<(TensorsInfo, Vec<Vec<u8>>)> {
        let mut buffers = Vec::with_capacity(self.tensors.len());
        for (i, t) in self.tensors.into_iter().enumerate() {
            buffers.push(t.ok_or_else(|| MlError::invalid(format!("tensor {} has no buffer", i)))?);
        }
        Ok((self.info, buffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::TensorType;

    fn info() -> TensorsInfo {
        let mut info = TensorsInfo::new();
        info.set_count(2).unwrap();
        info.set_tensor_type(0, TensorType::Int16).unwrap();
        info.set_tensor_dimension(0, &[2, 3]).unwrap();
        info.set_tensor_type(1, TensorType::UInt8).unwrap();
        info.set_tensor_dimension(1, &[5]).unwrap();
        info
    }

    #[test]
    fn test_create_sizes_buffers() {
        let data = TensorsData::create(&info()).unwrap();
        assert_eq!(data.count(), 2);
        assert_eq!(data.tensor_data(0).unwrap().len(), 12);
        assert_eq!(data.tensor_data(1).unwrap().len(), 5);
        assert_eq!(data.total_size(), info().tensor_size(-1).unwrap());
    }

    #[test]
    fn test_create_rejects_invalid_info() {
        assert!(TensorsData::create(&TensorsInfo::new()).is_err());
        let mut unset = TensorsInfo::new();
        unset.set_count(1).unwrap();
        unset.set_tensor_type(0, TensorType::UInt8).unwrap();
        assert!(TensorsData::create(&unset).is_err());
    }

    #[test]
    fn test_set_data_checks_length() {
        let mut data = TensorsData::create(&info()).unwrap();
        assert!(data.set_tensor_data(1, &[1, 2, 3, 4, 5, 6]).is_err());
        assert!(data.set_tensor_data(1, &[1, 2, 3]).is_err());
        assert!(data.set_tensor_data(2, &[1]).is_err());
        data.set_tensor_data(1, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(data.tensor_data(1).unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut data = TensorsData::create(&info()).unwrap();
        data.set_tensor_data(1, &[9, 9, 9, 9, 9]).unwrap();
        let mut copy = data.clone();
        assert_eq!(copy.tensor_data(1).unwrap(), data.tensor_data(1).unwrap());

        copy.tensor_data_mut(1).unwrap()[0] = 0;
        assert_eq!(data.tensor_data(1).unwrap()[0], 9);
    }

    #[test]
    fn test_no_alloc_shell() {
        let mut data = TensorsData::create_no_alloc(&info()).unwrap();
        assert!(!data.is_allocated());
        assert!(data.tensor_data(0).is_err());
        data.set_tensor_data(1, &[0; 5]).unwrap();
        data.set_tensor_data(0, &[0; 12]).unwrap();
        assert!(data.is_allocated());
    }
}
