use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum rank of a tensor in the default (fixed) representation.
pub const RANK_LIMIT: usize = 4;

/// Maximum rank of a tensor in the extended representation.
pub const RANK_LIMIT_EXTENDED: usize = 16;

/// Maximum number of tensors in one tensor set.
pub const SIZE_LIMIT: usize = 16;

/// Element type of a tensor.
///
/// Discriminants follow the engine's own type enumeration, so a type read
/// from a stream header can be used without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TensorType {
    Int32 = 0,
    UInt32 = 1,
    Int16 = 2,
    UInt16 = 3,
    Int8 = 4,
    UInt8 = 5,
    Float64 = 6,
    Float32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float16 = 10,
    Unknown = 11,
}

impl TensorType {
    /// Byte width of one element, 0 for `Unknown`.
    pub fn element_size(self) -> usize {
        match self {
            TensorType::Int8 | TensorType::UInt8 => 1,
            TensorType::Int16 | TensorType::UInt16 | TensorType::Float16 => 2,
            TensorType::Int32 | TensorType::UInt32 | TensorType::Float32 => 4,
            TensorType::Int64 | TensorType::UInt64 | TensorType::Float64 => 8,
            TensorType::Unknown => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TensorType::Int32 => "int32",
            TensorType::UInt32 => "uint32",
            TensorType::Int16 => "int16",
            TensorType::UInt16 => "uint16",
            TensorType::Int8 => "int8",
            TensorType::UInt8 => "uint8",
            TensorType::Float64 => "float64",
            TensorType::Float32 => "float32",
            TensorType::Int64 => "int64",
            TensorType::UInt64 => "uint64",
            TensorType::Float16 => "float16",
            TensorType::Unknown => "unknown",
        }
    }

    pub fn from_u32(value: u32) -> TensorType {
        match value {
            0 => TensorType::Int32,
            1 => TensorType::UInt32,
            2 => TensorType::Int16,
            3 => TensorType::UInt16,
            4 => TensorType::Int8,
            5 => TensorType::UInt8,
            6 => TensorType::Float64,
            7 => TensorType::Float32,
            8 => TensorType::Int64,
            9 => TensorType::UInt64,
            10 => TensorType::Float16,
            _ => TensorType::Unknown,
        }
    }
}

impl Default for TensorType {
    fn default() -> Self {
        TensorType::Unknown
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().as_str() {
            "int32" => TensorType::Int32,
            "uint32" => TensorType::UInt32,
            "int16" => TensorType::Int16,
            "uint16" => TensorType::UInt16,
            "int8" => TensorType::Int8,
            "uint8" => TensorType::UInt8,
            "float64" => TensorType::Float64,
            "float32" => TensorType::Float32,
            "int64" => TensorType::Int64,
            "uint64" => TensorType::UInt64,
            "float16" => TensorType::Float16,
            other => return Err(format!("unknown tensor type '{}'", other)),
        };
        Ok(t)
    }
}

/// Describes one tensor: element type, per-axis extents and an optional name.
///
/// An empty dimension, or one holding a zero extent, marks an unset
/// descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: Option<String>,
    pub tensor_type: TensorType,
    pub dimension: Vec<u32>,
}

impl TensorInfo {
    pub fn new(tensor_type: TensorType, dimension: &[u32]) -> Self {
        Self {
            name: None,
            tensor_type,
            dimension: dimension.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dimension.len()
    }

    pub fn is_valid(&self) -> bool {
        self.tensor_type != TensorType::Unknown
            && !self.dimension.is_empty()
            && self.dimension.iter().all(|&d| d >= 1)
            && self.byte_size().is_some()
    }

    /// Number of elements, 0 for an unset descriptor. `None` when the
    /// extents multiply past `usize`.
    pub fn element_count(&self) -> Option<usize> {
        if self.dimension.is_empty() || self.dimension.contains(&0) {
            return Some(0);
        }
        self.dimension
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    /// Byte size of the tensor: product of extents times element width.
    pub fn byte_size(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.tensor_type.element_size())
    }

    /// Extents with trailing 1s removed; `[3, 4, 1, 1]` and `[3, 4]` describe
    /// the same shape.
    pub fn normalized_dimension(&self) -> &[u32] {
        let mut end = self.dimension.len();
        while end > 1 && self.dimension[end - 1] == 1 {
            end -= 1;
        }
        &self.dimension[..end]
    }

    /// Shape equality, ignoring names.
    pub fn same_shape(&self, other: &TensorInfo) -> bool {
        self.tensor_type == other.tensor_type
            && self.normalized_dimension() == other.normalized_dimension()
    }
}

/// Format a dimension as `d0:d1:...`.
pub fn dimension_to_string(dimension: &[u32]) -> String {
    dimension
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse `d0:d1:...`, rejecting empty or non-numeric entries.
pub fn parse_dimension(s: &str) -> Result<Vec<u32>, String> {
    let dims = s
        .trim()
        .split(':')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid dimension entry '{}' in '{}'", part, s))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if dims.len() > RANK_LIMIT_EXTENDED {
        return Err(format!("dimension '{}' exceeds rank limit", s));
    }
    Ok(dims)
}
