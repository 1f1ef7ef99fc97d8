use super::dispatcher::{CallbackDispatcher, StateCallback};
use super::graph::{Graph, Link};
use super::state::PipelineState;
use crate::config::PipelineConfig;
use crate::core::node::OutputLink;
use crate::core::{Element, NodeContext, ProcessingNode, StreamItem};
use crate::error::{MlError, Result};
use crate::observability::{MetricsCollector, MetricsSnapshot};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Messages from element tasks to the pipeline's bus listener.
#[derive(Debug, Clone)]
pub enum BusMessage {
    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },
    Eos {
        element: String,
    },
    Error {
        element: String,
        message: String,
    },
}

type Inbound = mpsc::Receiver<(usize, StreamItem)>;

/// Parts of the graph that stay parked until the first start.
struct Pending {
    nodes: Vec<Box<dyn ProcessingNode>>,
    receivers: Vec<Inbound>,
    links: Vec<Link>,
}

/// Held by every task; the engine learns that all tasks are gone when the
/// last clone drops.
#[derive(Clone)]
struct TaskGuard(#[allow(dead_code)] crossbeam_channel::Sender<()>);

/// A node together with its task's guard. Fields drop in order, so the
/// node is gone before the guard reports the task finished.
struct Running {
    node: Box<dyn ProcessingNode>,
    _guard: TaskGuard,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Running engine of one pipeline: one tokio task per element on a runtime
/// owned by the pipeline.
pub struct AsyncPipeline {
    runtime: Mutex<Option<Runtime>>,
    config: PipelineConfig,
    elements: Vec<Arc<Element>>,
    inbound: Vec<mpsc::Sender<(usize, StreamItem)>>,
    sources: Vec<usize>,
    pending: Mutex<Option<Pending>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<Mutex<PipelineState>>,
    failure: Arc<Mutex<Option<String>>>,
    target: watch::Sender<PipelineState>,
    bus: mpsc::UnboundedSender<BusMessage>,
    dispatcher: Arc<CallbackDispatcher>,
    metrics: MetricsCollector,
    guard: Mutex<Option<TaskGuard>>,
    done: crossbeam_channel::Receiver<()>,
    flush_ack: crossbeam_channel::Sender<()>,
    flushed: crossbeam_channel::Receiver<()>,
}

impl AsyncPipeline {
    pub fn new(
        graph: Graph,
        config: PipelineConfig,
        dispatcher: Arc<CallbackDispatcher>,
        state_callback: Option<StateCallback>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("mlstream-worker")
            .enable_all()
            .build()?;

        let Graph {
            elements,
            nodes,
            metrics,
            links,
        } = graph;

        let mut inbound = Vec::with_capacity(elements.len());
        let mut receivers = Vec::with_capacity(elements.len());
        for _ in &elements {
            let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
            inbound.push(tx);
            receivers.push(rx);
        }
        let sources = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_source())
            .map(|(i, _)| i)
            .collect();

        let mut collector = MetricsCollector::new();
        for m in metrics {
            collector.register(m);
        }

        let (done_tx, done) = crossbeam_channel::bounded(1);
        let (flush_ack, flushed) = crossbeam_channel::unbounded();
        let guard = TaskGuard(done_tx);
        let (bus, bus_rx) = mpsc::unbounded_channel();
        let (target, _) = watch::channel(PipelineState::Null);
        let state = Arc::new(Mutex::new(PipelineState::Null));
        let failure = Arc::new(Mutex::new(None));

        let listener = runtime.spawn(listen(
            bus_rx,
            Arc::clone(&state),
            Arc::clone(&failure),
            Arc::clone(&dispatcher),
            state_callback,
            guard.clone(),
        ));

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            config,
            elements,
            inbound,
            sources,
            pending: Mutex::new(Some(Pending {
                nodes,
                receivers,
                links,
            })),
            handles: Mutex::new(vec![listener]),
            state,
            failure,
            target,
            bus,
            dispatcher,
            metrics: collector,
            guard: Mutex::new(Some(guard)),
            done,
            flush_ack,
            flushed,
        })
    }

    pub fn elements(&self) -> &[Arc<Element>] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&Arc<Element>> {
        self.elements.iter().find(|e| e.name() == name)
    }

    pub fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.dispatcher
    }

    /// Last state reported on the bus.
    pub fn state(&self) -> PipelineState {
        *locked(&self.state)
    }

    pub fn metrics_snapshot(&self) -> Vec<MetricsSnapshot> {
        self.metrics.snapshot()
    }

    /// Fails once an element reported an error.
    pub fn check(&self) -> Result<()> {
        match locked(&self.failure).as_ref() {
            Some(message) => Err(MlError::pipe(message.clone())),
            None => Ok(()),
        }
    }

    /// Request a state. Returns once the request is posted, not once every
    /// element reached it.
    pub fn set_state(&self, target: PipelineState) -> Result<()> {
        self.check()?;
        if target == PipelineState::Unknown {
            return Err(MlError::invalid("cannot request the UNKNOWN state"));
        }
        if target >= PipelineState::Paused {
            self.spawn_elements()?;
        }

        let mut previous = *self.target.borrow();
        self.target.send_replace(target);
        for step in previous.steps_to(target) {
            // A send error means the listener is gone, i.e. shutdown.
            let _ = self.bus.send(BusMessage::StateChanged {
                old: previous,
                new: step,
            });
            previous = step;
        }
        Ok(())
    }

    /// Pause, drop the buffered state of every element, and optionally
    /// resume playing.
    ///
    /// Returns once every source took the flush, so data injected after
    /// the call is never discarded by it. Fails with `TimedOut` when a
    /// source does not take it within `shutdown_timeout_ms`; the pipeline
    /// then stays paused.
    pub fn flush(&self, resume: bool) -> Result<()> {
        self.check()?;
        let started = locked(&self.pending).is_none();
        if started {
            if *self.target.borrow() > PipelineState::Paused {
                self.set_state(PipelineState::Paused)?;
            }
            while self.flushed.try_recv().is_ok() {}

            let mut expected = 0;
            for &i in &self.sources {
                match self.inbound[i].try_send((0, StreamItem::Flush)) {
                    Ok(()) => expected += 1,
                    Err(e) => warn!(element = %self.elements[i].name(), error = %e, "flush not delivered"),
                }
            }
            let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
            for acked in 0..expected {
                let left = deadline.saturating_duration_since(Instant::now());
                if self.flushed.recv_timeout(left).is_err() {
                    warn!(acked, expected, "source did not acknowledge flush in time");
                    return Err(MlError::TimedOut(format!(
                        "{} of {} sources acknowledged the flush within {} ms",
                        acked, expected, self.config.shutdown_timeout_ms
                    )));
                }
            }
            if expected < self.sources.len() {
                return Err(MlError::pipe("flush could not be delivered to every source"));
            }
            debug!(sources = expected, "flush delivered");
        }
        if resume {
            self.set_state(PipelineState::Playing)?;
        }
        Ok(())
    }

    fn spawn_elements(&self) -> Result<()> {
        let Some(pending) = locked(&self.pending).take() else {
            return Ok(());
        };
        let runtime = locked(&self.runtime);
        let runtime = runtime
            .as_ref()
            .ok_or_else(|| MlError::pipe("pipeline is shut down"))?;
        let guard = locked(&self.guard)
            .clone()
            .ok_or_else(|| MlError::pipe("pipeline is shut down"))?;

        let Pending {
            nodes,
            receivers,
            links,
        } = pending;
        let mut handles = locked(&self.handles);

        for (i, (node, rx)) in nodes.into_iter().zip(receivers).enumerate() {
            let element = Arc::clone(&self.elements[i]);
            let mut outputs: Vec<Option<OutputLink>> = element.src_pads().iter().map(|_| None).collect();
            for link in links.iter().filter(|l| l.src == i) {
                outputs[link.src_pad] = Some(OutputLink {
                    tx: self.inbound[link.sink].clone(),
                    peer_pad: link.sink_pad,
                });
            }
            let n_inputs = links.iter().filter(|l| l.sink == i).count();
            let metrics = self
                .metrics
                .get(element.name())
                .ok_or_else(|| MlError::pipe(format!("no metrics for '{}'", element.name())))?;
            let ctx = NodeContext::new(element, outputs, Arc::clone(&self.dispatcher), metrics);
            let bus = self.bus.clone();
            let is_source = node.is_source();
            let running = Running {
                node,
                _guard: guard.clone(),
            };

            let handle = if is_source {
                let ack = self.flush_ack.clone();
                runtime.spawn(run_source(running, ctx, rx, self.target.subscribe(), ack, bus))
            } else {
                runtime.spawn(run_element(running, ctx, rx, n_inputs, bus))
            };
            handles.push(handle);
        }
        info!(elements = self.elements.len(), "element tasks spawned");
        Ok(())
    }

    /// Stop every task, wait for in-flight callbacks and close the
    /// dispatcher. Safe to call more than once.
    ///
    /// Fails with `TimedOut` when a task still runs after the in-flight
    /// callbacks finished and a further `shutdown_timeout_ms` passed. The
    /// engine is stopped either way.
    pub fn shutdown(&self) -> Result<()> {
        let Some(runtime) = locked(&self.runtime).take() else {
            return Ok(());
        };
        for handle in locked(&self.handles).drain(..) {
            handle.abort();
        }
        drop(locked(&self.pending).take());
        drop(locked(&self.guard).take());

        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let mut finished = self.wait_tasks(timeout);
        // A task blocked in a user callback ends once the callback returns.
        self.dispatcher.close();
        if !finished {
            finished = self.wait_tasks(timeout);
        }

        runtime.shutdown_background();
        *locked(&self.state) = PipelineState::Null;
        if !finished {
            warn!(timeout_ms = self.config.shutdown_timeout_ms, "element tasks outlived shutdown");
            return Err(MlError::TimedOut(format!(
                "element tasks still running {} ms after their callbacks finished",
                self.config.shutdown_timeout_ms
            )));
        }
        info!("pipeline engine shut down");
        Ok(())
    }

    /// True once every task dropped its guard.
    fn wait_tasks(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.done.recv_timeout(left) {
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return true,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => return false,
                Ok(()) => {}
            }
        }
    }
}

impl Drop for AsyncPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "pipeline engine dropped uncleanly");
        }
    }
}

async fn listen(
    mut bus: mpsc::UnboundedReceiver<BusMessage>,
    state: Arc<Mutex<PipelineState>>,
    failure: Arc<Mutex<Option<String>>>,
    dispatcher: Arc<CallbackDispatcher>,
    callback: Option<StateCallback>,
    _guard: TaskGuard,
) {
    while let Some(message) = bus.recv().await {
        let reported = match message {
            BusMessage::StateChanged { old, new } => {
                if locked(&failure).is_some() {
                    continue;
                }
                debug!(%old, %new, "state changed");
                *locked(&state) = new;
                new
            }
            BusMessage::Eos { element } => {
                info!(element = %element, "end of stream");
                continue;
            }
            BusMessage::Error { element, message } => {
                error!(element = %element, error = %message, "element failed");
                let mut failure = locked(&failure);
                if failure.is_some() {
                    continue;
                }
                *failure = Some(format!("{}: {}", element, message));
                *locked(&state) = PipelineState::Unknown;
                PipelineState::Unknown
            }
        };
        if let Some(cb) = &callback {
            dispatcher.dispatch_blocking(|| cb(reported));
        }
    }
}

fn report(bus: &mpsc::UnboundedSender<BusMessage>, ctx: &NodeContext, err: anyhow::Error) {
    let _ = bus.send(BusMessage::Error {
        element: ctx.element().name().to_string(),
        message: format!("{:#}", err),
    });
}

async fn run_element(
    mut running: Running,
    mut ctx: NodeContext,
    mut rx: Inbound,
    n_inputs: usize,
    bus: mpsc::UnboundedSender<BusMessage>,
) {
    let node = &mut running.node;
    let mut eos_pads = HashSet::new();
    while let Some((pad, item)) = rx.recv().await {
        let result = match item {
            StreamItem::Buffer(buffer) => node.process(pad, buffer, &mut ctx).await,
            StreamItem::Flush => {
                eos_pads.clear();
                match node.flush(&mut ctx).await {
                    Ok(()) => ctx.send_all(StreamItem::Flush).await,
                    Err(e) => Err(e),
                }
            }
            StreamItem::Eos => {
                eos_pads.insert(pad);
                if eos_pads.len() < n_inputs.max(1) {
                    Ok(())
                } else {
                    match node.finish(&mut ctx).await {
                        Ok(()) if ctx.src_pad_count() == 0 => {
                            let _ = bus.send(BusMessage::Eos {
                                element: ctx.element().name().to_string(),
                            });
                            Ok(())
                        }
                        Ok(()) => ctx.send_all(StreamItem::Eos).await,
                        Err(e) => Err(e),
                    }
                }
            }
        };
        if let Err(e) = result {
            report(&bus, &ctx, e);
            return;
        }
    }
}

async fn run_source(
    mut running: Running,
    mut ctx: NodeContext,
    mut rx: Inbound,
    mut target: watch::Receiver<PipelineState>,
    ack: crossbeam_channel::Sender<()>,
    bus: mpsc::UnboundedSender<BusMessage>,
) {
    let node = &mut running.node;
    let mut finished = false;
    loop {
        let playing = *target.borrow_and_update() == PipelineState::Playing;

        if !playing || finished {
            tokio::select! {
                changed = target.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                control = rx.recv() => match control {
                    Some((_, StreamItem::Flush)) => {
                        if let Err(e) = source_flush(node, &mut ctx).await {
                            report(&bus, &ctx, e);
                            return;
                        }
                        let _ = ack.send(());
                        finished = false;
                    }
                    Some(_) => {}
                    None => return,
                },
            }
            continue;
        }

        tokio::select! {
            biased;
            control = rx.recv() => match control {
                Some((_, StreamItem::Flush)) => {
                    if let Err(e) = source_flush(node, &mut ctx).await {
                        report(&bus, &ctx, e);
                        return;
                    }
                    let _ = ack.send(());
                }
                Some(_) => {}
                None => return,
            },
            changed = target.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            produced = node.produce(&mut ctx) => match produced {
                Ok(Some(buffer)) => {
                    if let Err(e) = ctx.push(0, buffer).await {
                        report(&bus, &ctx, e);
                        return;
                    }
                }
                Ok(None) => {
                    debug!(element = %ctx.element().name(), "source finished");
                    finished = true;
                    if let Err(e) = ctx.send_all(StreamItem::Eos).await {
                        report(&bus, &ctx, e);
                        return;
                    }
                }
                Err(e) => {
                    report(&bus, &ctx, e);
                    return;
                }
            },
        }
    }
}

async fn source_flush(node: &mut Box<dyn ProcessingNode>, ctx: &mut NodeContext) -> anyhow::Result<()> {
    node.flush(ctx).await?;
    ctx.send_all(StreamItem::Flush).await
}
