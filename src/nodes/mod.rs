//! Built-in element types.

pub mod appsrc;
pub mod flow;
pub mod sinks;
pub mod tensor_aggregator;
pub mod tensor_buffer;
pub mod tensor_converter;
pub mod tensor_filter;
pub mod tensor_if;
pub mod videotestsrc;

pub use appsrc::AppSrc;
pub use flow::{CapsFilter, InputSelector, OutputSelector, Passthrough, Tee, Valve};
pub use sinks::{CallbackSink, FakeSink, FileSink};
pub use tensor_aggregator::TensorAggregator;
pub use tensor_converter::TensorConverter;
pub use tensor_filter::TensorFilter;
pub use tensor_if::TensorIf;
pub use videotestsrc::VideoTestSrc;

use crate::registry::metadata::ElementMetadataFactory;

static BUILTIN: &[ElementMetadataFactory] = &[
    videotestsrc::metadata,
    appsrc::metadata,
    tensor_converter::metadata,
    tensor_aggregator::metadata,
    tensor_filter::metadata,
    tensor_if::metadata,
    flow::valve_metadata,
    flow::tee_metadata,
    flow::queue_metadata,
    flow::videoconvert_metadata,
    flow::capsfilter_metadata,
    flow::input_selector_metadata,
    flow::output_selector_metadata,
    sinks::tensor_sink_metadata,
    sinks::appsink_metadata,
    sinks::fakesink_metadata,
    sinks::filesink_metadata,
];

/// Metadata factories of every built-in element type.
pub fn builtin_elements() -> &'static [ElementMetadataFactory] {
    BUILTIN
}
