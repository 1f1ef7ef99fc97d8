//! Serialized delivery of engine events to user callbacks.
//!
//! Every pipeline owns one [`CallbackDispatcher`]. Sink deliveries, source
//! notifications and state changes of that pipeline all pass through its
//! lock, so no two callbacks of one pipeline ever run at the same time.

use crate::core::{TensorsData, TensorsInfo};
use crate::engine::state::PipelineState;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

/// Called once per buffer arriving at a sink.
pub type SinkCallback = Arc<dyn Fn(&TensorsData, &TensorsInfo) + Send + Sync>;

/// Called with the new state after every pipeline state change.
pub type StateCallback = Arc<dyn Fn(PipelineState) + Send + Sync>;

/// Source notifications. Both are optional.
#[derive(Clone, Default)]
pub struct SrcCallbacks {
    /// The source queue ran low; the argument is the number of buffers
    /// still queued.
    pub need_data: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    /// The source queue reached its high-water mark.
    pub enough_data: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl SrcCallbacks {
    pub fn need_data(f: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            need_data: Some(Arc::new(f)),
            enough_data: None,
        }
    }

    pub fn with_enough_data(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.enough_data = Some(Arc::new(f));
        self
    }
}

pub struct CallbackDispatcher {
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Run `f` under the pipeline lock. Does nothing once closed.
    ///
    /// A panicking callback is logged and contained; it never poisons the
    /// lock for later deliveries.
    pub fn dispatch<F: FnOnce()>(&self, f: F) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            error!("user callback panicked; delivery skipped");
        }
    }

    /// Same as [`dispatch`](Self::dispatch), for callers on a runtime worker
    /// thread. Waiting for the lock must not stall other tasks.
    pub fn dispatch_blocking<F: FnOnce()>(&self, f: F) {
        use tokio::runtime::{Handle, RuntimeFlavor};
        match Handle::try_current() {
            Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.dispatch(f))
            }
            _ => self.dispatch(f),
        }
    }

    /// Wait for the in-flight callback, if any, and refuse every later one.
    pub fn close(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
