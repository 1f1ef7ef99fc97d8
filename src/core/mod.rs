pub mod buffer;
pub mod caps;
pub mod meta;
pub mod node;
pub mod tensor;
pub mod tensors_data;
pub mod tensors_info;

pub use buffer::{Buffer, BufferPolicy, Memory};
pub use caps::{Caps, Fraction, TensorCaps, VideoCaps, VideoFormat};
pub use meta::{TensorFormat, TensorMetaHeader};
pub use node::{Element, NodeContext, ProcessingNode, StreamItem};
pub use tensor::{TensorInfo, TensorType, RANK_LIMIT, RANK_LIMIT_EXTENDED, SIZE_LIMIT};
pub use tensors_data::TensorsData;
pub use tensors_info::{InfoMode, TensorsInfo};
