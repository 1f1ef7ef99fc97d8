use super::buffer::Buffer;
use super::caps::Caps;
use super::tensors_info::TensorsInfo;
use crate::config::PipelineConfig;
use crate::engine::dispatcher::{CallbackDispatcher, SinkCallback, SrcCallbacks};
use crate::observability::NodeMetrics;
use crate::registry::metadata::{ElementKind, ElementMetadata, PadTemplate};
use crate::registry::properties::PropertyStore;
use crate::resilience::ErrorPolicy;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

/// Items travelling downstream on a link.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Buffer(Buffer),
    /// Drop any internal state; buffers before it are already processed.
    Flush,
    Eos,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// The part of an element the control API can reach while it runs:
/// its name, properties, pads, negotiated caps and signals.
pub struct Element {
    name: String,
    type_name: &'static str,
    kind: ElementKind,
    props: PropertyStore,
    sink_pads: Mutex<Vec<String>>,
    src_pads: Mutex<Vec<String>>,
    caps: Mutex<Caps>,
    next_signal_id: AtomicU64,
    new_data: Mutex<Vec<(u64, SinkCallback)>>,
    src_events: Mutex<Option<(u64, SrcCallbacks)>>,
    input: Mutex<Option<mpsc::UnboundedSender<Buffer>>>,
    last_info: Mutex<Option<TensorsInfo>>,
}

impl Element {
    pub fn new(name: impl Into<String>, meta: &ElementMetadata) -> Self {
        let fixed = |t: PadTemplate| match t {
            PadTemplate::Always(names) => names.iter().map(|s| s.to_string()).collect(),
            _ => Vec::new(),
        };
        Self {
            name: name.into(),
            type_name: meta.type_name,
            kind: meta.kind,
            props: PropertyStore::new(meta.properties.clone()),
            sink_pads: Mutex::new(fixed(meta.sink_pads)),
            src_pads: Mutex::new(fixed(meta.src_pads)),
            caps: Mutex::new(Caps::Any),
            next_signal_id: AtomicU64::new(1),
            new_data: Mutex::new(Vec::new()),
            src_events: Mutex::new(None),
            input: Mutex::new(None),
            last_info: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn props(&self) -> &PropertyStore {
        &self.props
    }

    pub fn sink_pads(&self) -> Vec<String> {
        locked(&self.sink_pads).clone()
    }

    pub fn src_pads(&self) -> Vec<String> {
        locked(&self.src_pads).clone()
    }

    pub(crate) fn add_sink_pad(&self, name: String) -> usize {
        let mut pads = locked(&self.sink_pads);
        pads.push(name);
        pads.len() - 1
    }

    pub(crate) fn add_src_pad(&self, name: String) -> usize {
        let mut pads = locked(&self.src_pads);
        pads.push(name);
        pads.len() - 1
    }

    /// Caps negotiated on the element's src pads.
    pub fn caps(&self) -> Caps {
        locked(&self.caps).clone()
    }

    pub(crate) fn set_caps(&self, caps: Caps) {
        *locked(&self.caps) = caps;
    }

    pub fn connect_new_data(&self, callback: SinkCallback) -> u64 {
        let id = self.next_signal_id.fetch_add(1, Ordering::Relaxed);
        locked(&self.new_data).push((id, callback));
        id
    }

    pub fn disconnect_new_data(&self, id: u64) -> bool {
        let mut callbacks = locked(&self.new_data);
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Snapshot of the connected sink callbacks, in connection order.
    pub fn new_data_callbacks(&self) -> Vec<SinkCallback> {
        locked(&self.new_data).iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    /// Install source callbacks for `owner`, replacing any other owner's.
    pub fn set_src_callbacks(&self, owner: u64, callbacks: SrcCallbacks) {
        *locked(&self.src_events) = Some((owner, callbacks));
    }

    /// Remove the source callbacks if `owner` still holds them.
    pub fn clear_src_callbacks(&self, owner: u64) {
        let mut events = locked(&self.src_events);
        if matches!(&*events, Some((id, _)) if *id == owner) {
            *events = None;
        }
    }

    pub fn src_callbacks(&self) -> Option<SrcCallbacks> {
        locked(&self.src_events).as_ref().map(|(_, cb)| cb.clone())
    }

    /// Open the injection queue of a source element.
    pub(crate) fn open_input(&self) -> mpsc::UnboundedReceiver<Buffer> {
        let (tx, rx) = mpsc::unbounded_channel();
        *locked(&self.input) = Some(tx);
        rx
    }

    pub(crate) fn push_input(&self, buffer: Buffer) -> Result<()> {
        let input = locked(&self.input);
        let tx = input
            .as_ref()
            .ok_or_else(|| anyhow!("element '{}' does not accept injected data", self.name))?;
        tx.send(buffer)
            .map_err(|_| anyhow!("element '{}' no longer accepts data", self.name))
    }

    /// Layout of the most recent injected buffer.
    pub fn last_info(&self) -> Option<TensorsInfo> {
        locked(&self.last_info).clone()
    }

    pub(crate) fn set_last_info(&self, info: TensorsInfo) {
        *locked(&self.last_info) = Some(info);
    }
}

pub(crate) struct OutputLink {
    pub tx: mpsc::Sender<(usize, StreamItem)>,
    pub peer_pad: usize,
}

/// Runtime context handed to every processing hook.
pub struct NodeContext {
    element: Arc<Element>,
    outputs: Vec<Option<OutputLink>>,
    dispatcher: Arc<CallbackDispatcher>,
    metrics: Arc<NodeMetrics>,
}

impl NodeContext {
    pub(crate) fn new(
        element: Arc<Element>,
        outputs: Vec<Option<OutputLink>>,
        dispatcher: Arc<CallbackDispatcher>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            element,
            outputs,
            dispatcher,
            metrics,
        }
    }

    pub fn element(&self) -> &Arc<Element> {
        &self.element
    }

    pub fn props(&self) -> &PropertyStore {
        self.element.props()
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    pub fn src_pad_count(&self) -> usize {
        self.outputs.len()
    }

    /// Send an item out of src pad `pad`. Unlinked pads swallow the item,
    /// as do peers that already finished.
    pub async fn send(&self, pad: usize, item: StreamItem) -> Result<()> {
        match self.outputs.get(pad) {
            Some(Some(link)) => {
                if link.tx.send((link.peer_pad, item)).await.is_err() {
                    trace!(element = %self.element.name(), pad, "peer gone, item discarded");
                }
            }
            Some(None) => {
                trace!(element = %self.element.name(), pad, "pad not linked, item discarded");
            }
            None => return Err(anyhow!("element '{}' has no src pad {}", self.element.name(), pad)),
        }
        Ok(())
    }

    pub async fn push(&self, pad: usize, buffer: Buffer) -> Result<()> {
        self.send(pad, StreamItem::Buffer(buffer)).await
    }

    /// Send an item out of every src pad.
    pub async fn send_all(&self, item: StreamItem) -> Result<()> {
        for pad in 0..self.outputs.len() {
            self.send(pad, item.clone()).await?;
        }
        Ok(())
    }

    /// Run a user callback through the pipeline's dispatcher.
    pub fn dispatch<F: FnOnce()>(&self, f: F) {
        self.dispatcher.dispatch_blocking(f);
    }

    /// Note a buffer that was intentionally not forwarded.
    pub fn record_drop(&self) {
        self.metrics.record_buffer_dropped();
    }
}

/// Base trait for all graph elements.
#[async_trait]
pub trait ProcessingNode: Send {
    /// Called once after the element's description properties are applied.
    fn on_create(&mut self, _element: &Arc<Element>, _config: &PipelineConfig) -> Result<()> {
        Ok(())
    }

    /// Compute the caps of the element's src pads from the caps arriving on
    /// its linked sink pads. Sources receive no inputs and, when a caps
    /// filter follows them, that filter as `hint`.
    fn negotiate(&mut self, _element: &Element, inputs: &[Caps], _hint: Option<&Caps>) -> Result<Caps> {
        Ok(inputs.first().cloned().unwrap_or(Caps::Any))
    }

    /// Sources are driven through [`produce`](Self::produce) while the
    /// pipeline plays.
    fn is_source(&self) -> bool {
        false
    }

    /// How a failing [`process`](Self::process) call is handled.
    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Propagate
    }

    /// Next buffer of a source; `None` ends the stream.
    async fn produce(&mut self, _ctx: &mut NodeContext) -> Result<Option<Buffer>> {
        Ok(None)
    }

    /// Handle one buffer arriving on sink pad `pad`.
    async fn process(&mut self, _pad: usize, buffer: Buffer, ctx: &mut NodeContext) -> Result<()> {
        ctx.push(0, buffer).await
    }

    async fn flush(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        Ok(())
    }

    /// Called once every sink pad reached end of stream, before the end of
    /// stream is forwarded.
    async fn finish(&mut self, _ctx: &mut NodeContext) -> Result<()> {
        Ok(())
    }
}
