//! Public control surface of a pipeline.
//!
//! A [`Pipeline`] owns its engine; every handle obtained from it holds only
//! a weak back-reference and fails with `InvalidParameter` once the
//! pipeline is gone.

pub mod handles;

pub use handles::{ElementHandle, HandleRole, SinkHandle, SrcHandle, SwitchHandle, SwitchType, ValveHandle};

use crate::config::PipelineConfig;
use crate::core::Element;
use crate::engine::{AsyncPipeline, CallbackDispatcher, Graph, PipelineState, SinkCallback, StateCallback};
use crate::error::{MlError, Result};
use crate::observability::MetricsSnapshot;
use crate::registry::ElementKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// State shared between a pipeline and the handles leased from it.
pub(crate) struct PipelineInner {
    description: String,
    engine: AsyncPipeline,
    /// Active handle leases: handle id to `(node name, role)`.
    leases: Mutex<HashMap<u64, (String, HandleRole)>>,
    closed: AtomicBool,
}

impl PipelineInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn engine(&self) -> &AsyncPipeline {
        &self.engine
    }

    /// The named node, checked against the role a handle needs.
    fn resolve(&self, name: &str, role: HandleRole) -> Result<Arc<Element>> {
        if name.is_empty() {
            return Err(MlError::invalid("node name is empty"));
        }
        let element = self
            .engine
            .element(name)
            .ok_or_else(|| MlError::invalid(format!("no node named '{}' in the pipeline", name)))?;
        if !role.accepts(element.kind()) {
            return Err(MlError::invalid(format!(
                "node '{}' ({}) cannot be used as a {} handle",
                name,
                element.type_name(),
                role
            )));
        }
        Ok(Arc::clone(element))
    }

    pub(crate) fn lease(&self, id: u64, name: &str, role: HandleRole) {
        locked(&self.leases).insert(id, (name.to_string(), role));
        debug!(node = name, %role, id, "handle leased");
    }

    /// Drop a lease; `false` when it was not active.
    pub(crate) fn end_lease(&self, id: u64) -> bool {
        locked(&self.leases).remove(&id).is_some()
    }

    pub(crate) fn holds_lease(&self, id: u64) -> bool {
        locked(&self.leases).contains_key(&id)
    }
}

/// A constructed pipeline.
pub struct Pipeline {
    inner: Option<Arc<PipelineInner>>,
}

impl Pipeline {
    /// Build a pipeline from a textual description with the default
    /// configuration. The pipeline is left in `Ready`.
    pub fn construct(description: &str, state_callback: Option<StateCallback>) -> Result<Self> {
        Self::construct_with_config(description, state_callback, PipelineConfig::default())
    }

    pub fn construct_with_config(
        description: &str,
        state_callback: Option<StateCallback>,
        config: PipelineConfig,
    ) -> Result<Self> {
        if description.trim().is_empty() {
            return Err(MlError::invalid("pipeline description is empty"));
        }

        let graph = Graph::build(description, &config).map_err(|e| {
            warn!(error = %format!("{:#}", e), "pipeline construction failed");
            MlError::pipe(format!("{:#}", e))
        })?;

        let dispatcher = Arc::new(CallbackDispatcher::new());
        let engine = AsyncPipeline::new(graph, config, dispatcher, state_callback)?;
        engine.set_state(PipelineState::Ready)?;

        info!(description, elements = engine.elements().len(), "pipeline constructed");
        Ok(Self {
            inner: Some(Arc::new(PipelineInner {
                description: description.to_string(),
                engine,
                leases: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            })),
        })
    }

    fn inner(&self) -> Result<&Arc<PipelineInner>> {
        self.inner
            .as_ref()
            .filter(|i| !i.is_closed())
            .ok_or_else(|| MlError::invalid("pipeline is destroyed"))
    }

    pub fn description(&self) -> Result<&str> {
        Ok(&self.inner()?.description)
    }

    /// Request `Playing`. Returns once requested; watch the state callback
    /// or [`get_state`](Self::get_state) for completion.
    pub fn start(&self) -> Result<()> {
        debug!("pipeline start requested");
        self.inner()?.engine.set_state(PipelineState::Playing)
    }

    /// Request `Paused`.
    pub fn stop(&self) -> Result<()> {
        debug!("pipeline stop requested");
        self.inner()?.engine.set_state(PipelineState::Paused)
    }

    /// Last known state. `Unknown` after an element failed.
    pub fn get_state(&self) -> Result<PipelineState> {
        Ok(self.inner()?.engine.state())
    }

    /// Drop all buffered data in the pipeline, then resume playing when
    /// `start` is set.
    pub fn flush(&self, start: bool) -> Result<()> {
        debug!(start, "pipeline flush requested");
        self.inner()?.engine.flush(start)
    }

    pub fn metrics_snapshot(&self) -> Result<Vec<MetricsSnapshot>> {
        Ok(self.inner()?.engine.metrics_snapshot())
    }

    /// Names of every node in the pipeline.
    pub fn node_names(&self) -> Result<Vec<String>> {
        Ok(self
            .inner()?
            .engine
            .elements()
            .iter()
            .map(|e| e.name().to_string())
            .collect())
    }

    pub fn src_handle(&self, name: &str) -> Result<SrcHandle> {
        let inner = self.inner()?;
        let element = inner.resolve(name, HandleRole::Source)?;
        Ok(SrcHandle::new(inner, element))
    }

    /// Connect `callback` to the sink `name`. Every registration on a node
    /// receives every buffer.
    pub fn sink_register(&self, name: &str, callback: SinkCallback) -> Result<SinkHandle> {
        let inner = self.inner()?;
        let element = inner.resolve(name, HandleRole::Sink)?;
        if element.type_name() == "appsink" {
            element
                .props()
                .set("emit-signals", crate::registry::PropertyValue::Bool(true))?;
        }
        Ok(SinkHandle::new(inner, element, callback))
    }

    pub fn valve_handle(&self, name: &str) -> Result<ValveHandle> {
        let inner = self.inner()?;
        let element = inner.resolve(name, HandleRole::Valve)?;
        Ok(ValveHandle::new(inner, element))
    }

    pub fn switch_handle(&self, name: &str) -> Result<SwitchHandle> {
        let inner = self.inner()?;
        let element = inner.resolve(name, HandleRole::Switch)?;
        let switch_type = match element.kind() {
            ElementKind::InputSelector => SwitchType::Input,
            _ => SwitchType::Output,
        };
        Ok(SwitchHandle::new(inner, element, switch_type))
    }

    /// Property access to any node.
    pub fn element_handle(&self, name: &str) -> Result<ElementHandle> {
        let inner = self.inner()?;
        let element = inner.resolve(name, HandleRole::Element)?;
        Ok(ElementHandle::new(inner, element))
    }

    /// Stop the engine, wait for in-flight callbacks, invalidate every
    /// handle and release custom nodes used by the pipeline.
    ///
    /// The pipeline is gone even when this fails with `TimedOut`, which
    /// reports element tasks that did not stop in time.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        inner.closed.store(true, Ordering::Release);
        let leases = {
            let mut leases = locked(&inner.leases);
            let n = leases.len();
            leases.clear();
            n
        };
        let stopped = inner.engine.shutdown();
        info!(description = %inner.description, released_handles = leases, "pipeline destroyed");
        stopped
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "pipeline dropped uncleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_errors() {
        let err = Pipeline::construct("", None).err().unwrap();
        assert_eq!(err.status(), crate::Status::InvalidParameter);

        let err = Pipeline::construct("nonexistsrc ! fakesink", None).err().unwrap();
        assert_eq!(err.status(), crate::Status::StreamsPipe);
    }

    #[test]
    fn test_construct_leaves_pipeline_ready() {
        let pipeline = Pipeline::construct("videotestsrc num_buffers=2 ! fakesink", None).unwrap();
        let mut state = pipeline.get_state().unwrap();
        for _ in 0..50 {
            if state == PipelineState::Ready {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            state = pipeline.get_state().unwrap();
        }
        assert_eq!(state, PipelineState::Ready);
        assert_eq!(pipeline.node_names().unwrap(), vec!["videotestsrc0", "fakesink0"]);
        pipeline.destroy().unwrap();
    }
}
