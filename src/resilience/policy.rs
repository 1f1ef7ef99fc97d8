/// What the engine does when an element fails to process a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Report the failure on the pipeline bus; the pipeline turns `Unknown`.
    #[default]
    Propagate,

    /// Drop the offending buffer and keep streaming.
    DropBuffer,
}
