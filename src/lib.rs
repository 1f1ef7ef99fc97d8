pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod resilience;
pub mod single;

pub use config::PipelineConfig;
pub use core::{BufferPolicy, InfoMode, TensorInfo, TensorType, TensorsData, TensorsInfo};
pub use engine::{PipelineState, SinkCallback, SrcCallbacks, StateCallback};
pub use error::{status_of, MlError, Result, Status};
pub use pipeline::{
    ElementHandle, HandleRole, Pipeline, SinkHandle, SrcHandle, SwitchHandle, SwitchType, ValveHandle,
};
pub use registry::{register_easy_filter, register_if_condition, CustomRegistration};
pub use single::SingleShot;
