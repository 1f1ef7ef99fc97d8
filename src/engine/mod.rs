pub mod async_pipeline;
pub mod description;
pub mod dispatcher;
pub mod graph;
pub mod state;

pub use async_pipeline::{AsyncPipeline, BusMessage};
pub use dispatcher::{CallbackDispatcher, SinkCallback, SrcCallbacks, StateCallback};
pub use graph::Graph;
pub use state::PipelineState;
