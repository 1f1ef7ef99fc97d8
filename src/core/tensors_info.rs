//! Ordered, fixed-count tensor descriptions for one pipeline edge.

use super::tensor::{
    dimension_to_string, TensorInfo, TensorType, RANK_LIMIT, RANK_LIMIT_EXTENDED, SIZE_LIMIT,
};
use crate::error::{MlError, Result};
use serde::{Deserialize, Serialize};

/// Representation mode of a [`TensorsInfo`].
///
/// The two modes use different wire layouts, so they never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfoMode {
    Fixed,
    Extended,
}

impl InfoMode {
    pub fn rank_limit(self) -> usize {
        match self {
            InfoMode::Fixed => RANK_LIMIT,
            InfoMode::Extended => RANK_LIMIT_EXTENDED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorsInfo {
    mode: InfoMode,
    infos: Vec<TensorInfo>,
}

impl Default for TensorsInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorsInfo {
    /// Empty info in fixed mode (rank limit 4).
    pub fn new() -> Self {
        Self {
            mode: InfoMode::Fixed,
            infos: Vec::new(),
        }
    }

    /// Empty info in extended mode (rank limit 16).
    pub fn create_extended() -> Self {
        Self {
            mode: InfoMode::Extended,
            infos: Vec::new(),
        }
    }

    /// Build an info from descriptors; the mode is extended when any rank
    /// exceeds the fixed limit.
    pub fn from_infos(infos: Vec<TensorInfo>) -> Result<Self> {
        if infos.len() > SIZE_LIMIT {
            return Err(MlError::invalid(format!(
                "tensor count {} exceeds limit {}",
                infos.len(),
                SIZE_LIMIT
            )));
        }
        let mode = if infos.iter().any(|i| i.rank() > RANK_LIMIT) {
            InfoMode::Extended
        } else {
            InfoMode::Fixed
        };
        if infos.iter().any(|i| i.rank() > RANK_LIMIT_EXTENDED) {
            return Err(MlError::invalid("tensor rank exceeds extended limit"));
        }
        Ok(Self { mode, infos })
    }

    pub fn mode(&self) -> InfoMode {
        self.mode
    }

    pub fn is_extended(&self) -> bool {
        self.mode == InfoMode::Extended
    }

    pub fn rank_limit(&self) -> usize {
        self.mode.rank_limit()
    }

    pub fn count(&self) -> usize {
        self.infos.len()
    }

    /// Resize to `count` descriptors. New descriptors start unset.
    pub fn set_count(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > SIZE_LIMIT {
            return Err(MlError::invalid(format!(
                "tensor count must be in 1..={}, got {}",
                SIZE_LIMIT, count
            )));
        }
        self.infos.resize_with(count, TensorInfo::default);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.infos.len() {
            return Err(MlError::invalid(format!(
                "tensor index {} out of range (count {})",
                index,
                self.infos.len()
            )));
        }
        Ok(())
    }

    pub fn set_tensor_type(&mut self, index: usize, tensor_type: TensorType) -> Result<()> {
        self.check_index(index)?;
        if tensor_type == TensorType::Unknown {
            return Err(MlError::invalid("tensor type must not be unknown"));
        }
        self.infos[index].tensor_type = tensor_type;
        Ok(())
    }

    pub fn tensor_type(&self, index: usize) -> Result<TensorType> {
        self.check_index(index)?;
        Ok(self.infos[index].tensor_type)
    }

    pub fn set_tensor_dimension(&mut self, index: usize, dimension: &[u32]) -> Result<()> {
        self.check_index(index)?;
        if dimension.is_empty() || dimension.len() > self.rank_limit() {
            return Err(MlError::invalid(format!(
                "rank {} not in 1..={}",
                dimension.len(),
                self.rank_limit()
            )));
        }
        if dimension.iter().any(|&d| d == 0) {
            return Err(MlError::invalid(format!(
                "dimension {} has a zero extent",
                dimension_to_string(dimension)
            )));
        }
        let candidate = TensorInfo::new(self.infos[index].tensor_type, dimension);
        if candidate.byte_size().is_none() {
            return Err(MlError::invalid(format!(
                "dimension {} is too large to address",
                dimension_to_string(dimension)
            )));
        }
        self.infos[index].dimension = dimension.to_vec();
        Ok(())
    }

    pub fn tensor_dimension(&self, index: usize) -> Result<&[u32]> {
        self.check_index(index)?;
        Ok(&self.infos[index].dimension)
    }

    pub fn set_tensor_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.check_index(index)?;
        self.infos[index].name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Ok(())
    }

    pub fn tensor_name(&self, index: usize) -> Result<Option<&str>> {
        self.check_index(index)?;
        Ok(self.infos[index].name.as_deref())
    }

    pub fn tensor_info(&self, index: usize) -> Result<&TensorInfo> {
        self.check_index(index)?;
        Ok(&self.infos[index])
    }

    pub fn infos(&self) -> &[TensorInfo] {
        &self.infos
    }

    /// Byte size of tensor `index`, or of all tensors together when `index`
    /// is -1.
    pub fn tensor_size(&self, index: i32) -> Result<usize> {
        let too_large = || MlError::invalid("tensor size overflows usize");
        if index == -1 {
            return self.infos.iter().try_fold(0usize, |total, info| {
                info.byte_size()
                    .and_then(|size| total.checked_add(size))
                    .ok_or_else(too_large)
            });
        }
        if index < 0 {
            return Err(MlError::invalid(format!("invalid tensor index {}", index)));
        }
        self.tensor_info(index as usize)?.byte_size().ok_or_else(too_large)
    }

    /// True when the info has at least one tensor and every descriptor has a
    /// known type and a fully set dimension.
    pub fn validate(&self) -> bool {
        !self.infos.is_empty() && self.infos.iter().all(TensorInfo::is_valid)
    }

    /// Structural equality: same mode, same count, and per tensor the same
    /// type and shape. Names are informational and not compared.
    pub fn is_equal(&self, other: &TensorsInfo) -> bool {
        if self.mode != other.mode || self.count() != other.count() {
            return false;
        }
        self.infos
            .iter()
            .zip(other.infos.iter())
            .all(|(a, b)| a.same_shape(b))
    }

    /// Types joined with `.`, as used in caps strings.
    pub fn types_string(&self) -> String {
        self.infos
            .iter()
            .map(|i| i.tensor_type.name())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Dimensions joined with `.`, as used in caps strings.
    pub fn dimensions_string(&self) -> String {
        self.infos
            .iter()
            .map(|i| dimension_to_string(&i.dimension))
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TensorsInfo {
        let mut info = TensorsInfo::new();
        info.set_count(2).unwrap();
        info.set_tensor_type(0, TensorType::UInt8).unwrap();
        info.set_tensor_dimension(0, &[3, 4, 4, 1]).unwrap();
        info.set_tensor_name(0, "image").unwrap();
        info.set_tensor_type(1, TensorType::Float32).unwrap();
        info.set_tensor_dimension(1, &[10]).unwrap();
        info
    }

    #[test]
    fn test_unaddressable_dimension_is_rejected() {
        let mut info = TensorsInfo::new();
        info.set_count(1).unwrap();
        info.set_tensor_type(0, TensorType::Float64).unwrap();
        let err = info.set_tensor_dimension(0, &[u32::MAX; 4]).unwrap_err();
        assert_eq!(err.status(), crate::Status::InvalidParameter);
        assert!(!info.validate());

        // A descriptor built directly is caught when sized.
        let raw = TensorsInfo::from_infos(vec![TensorInfo::new(TensorType::Float64, &[u32::MAX; 4])]).unwrap();
        assert!(!raw.validate());
        assert_eq!(raw.tensor_size(0).unwrap_err().status(), crate::Status::InvalidParameter);
        assert_eq!(raw.tensor_size(-1).unwrap_err().status(), crate::Status::InvalidParameter);
        assert!(crate::core::TensorsData::create(&raw).is_err());
    }

    #[test]
    fn test_sizes() {
        let info = sample();
        assert!(info.validate());
        assert_eq!(info.tensor_size(0).unwrap(), 48);
        assert_eq!(info.tensor_size(1).unwrap(), 40);
        assert_eq!(info.tensor_size(-1).unwrap(), 88);
        assert!(info.tensor_size(2).is_err());
        assert!(info.tensor_size(-2).is_err());
    }

    #[test]
    fn test_mutation_validation() {
        let mut info = TensorsInfo::new();
        assert!(info.set_count(0).is_err());
        assert!(info.set_count(SIZE_LIMIT + 1).is_err());
        info.set_count(1).unwrap();
        assert!(!info.validate());
        assert!(info.set_tensor_type(1, TensorType::Int8).is_err());
        assert!(info.set_tensor_type(0, TensorType::Unknown).is_err());
        assert!(info.set_tensor_dimension(0, &[1, 0]).is_err());
        assert!(info.set_tensor_dimension(0, &[1, 1, 1, 1, 1]).is_err());

        let mut ext = TensorsInfo::create_extended();
        ext.set_count(1).unwrap();
        ext.set_tensor_dimension(0, &[1, 1, 1, 1, 2]).unwrap();
    }

    #[test]
    fn test_equality() {
        let a = sample();
        let b = a.clone();
        assert!(a.is_equal(&b));
        assert_eq!(b.tensor_name(0).unwrap(), Some("image"));

        let mut c = a.clone();
        c.set_tensor_type(1, TensorType::Float64).unwrap();
        assert!(!a.is_equal(&c));

        let mut d = a.clone();
        d.set_tensor_dimension(0, &[3, 4, 5, 1]).unwrap();
        assert!(!a.is_equal(&d));
    }

    #[test]
    fn test_fixed_and_extended_never_equal() {
        let fixed = sample();
        let mut ext = TensorsInfo::create_extended();
        ext.set_count(2).unwrap();
        for i in 0..2 {
            ext.set_tensor_type(i, fixed.tensor_type(i).unwrap()).unwrap();
            ext.set_tensor_dimension(i, fixed.tensor_dimension(i).unwrap())
                .unwrap();
        }
        assert!(!fixed.is_equal(&ext));
        assert!(!ext.is_equal(&fixed));
    }
}
